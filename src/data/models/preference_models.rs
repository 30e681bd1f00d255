use chrono::{Duration, NaiveDateTime};
use diesel::{Insertable, Queryable, Selectable};
use serde::Serialize;
use validator::Validate;

use crate::schema::user_preferences;

const MIN_REMINDERS_PER_DAY: i32 = 1;
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Unanswered reminders in a row after which reminders stop.
pub const PAUSE_AFTER_MISSES: i32 = 9;

/// Per-user reminder and session settings
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Insertable, Validate)]
#[diesel(table_name = user_preferences)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserPreferences {
    pub owner_id: i64,
    #[validate(range(min = 1, max = 10, message = "Reminders per day must be between 1 and 10"))]
    pub reminders_per_day: i32,
    #[validate(range(min = 1, max = 20, message = "Cards per session must be between 1 and 20"))]
    pub cards_per_session: i32,
    pub last_reminder_at: Option<NaiveDateTime>,
    pub next_reminder_at: NaiveDateTime,
    pub missed_reminders: i32,                  // Reminders sent with no activity in between
    pub reminders_paused: bool,                 // Set after PAUSE_AFTER_MISSES, cleared by any activity
    pub last_active_at: Option<NaiveDateTime>,
}

impl UserPreferences {
    pub fn new(
        owner_id: i64,
        reminders_per_day: i32,
        cards_per_session: i32,
        now: NaiveDateTime,
    ) -> Self {
        let mut prefs = Self {
            owner_id,
            reminders_per_day,
            cards_per_session,
            last_reminder_at: None,
            next_reminder_at: now,
            missed_reminders: 0,
            reminders_paused: false,
            last_active_at: None,
        };
        prefs.next_reminder_at = now + prefs.reminder_interval();
        prefs
    }

    /// Spacing between two reminders: a day split evenly.
    pub fn reminder_interval(&self) -> Duration {
        let per_day = i64::from(self.reminders_per_day.max(MIN_REMINDERS_PER_DAY));
        Duration::milliseconds(DAY_MILLIS / per_day)
    }

    /// Records an actual send. The next slot is counted from the send time,
    /// not from the previously planned slot, so a missed tick never queues
    /// catch-up reminders.
    pub fn mark_sent(&mut self, now: NaiveDateTime) {
        self.last_reminder_at = Some(now);
        self.next_reminder_at = now + self.reminder_interval();
    }

    /// Unanswered reminders so far, counting the last one sent if the user
    /// has not been active since.
    pub fn missed_so_far(&self) -> i32 {
        match (self.last_reminder_at, self.last_active_at) {
            (None, _) => self.missed_reminders,
            (Some(sent), Some(active)) if active >= sent => 0,
            (Some(_), _) => self.missed_reminders.saturating_add(1),
        }
    }

    /// Recomputes the next slot after a frequency change.
    pub fn reschedule(&mut self, now: NaiveDateTime) {
        let anchor = self.last_reminder_at.unwrap_or(now);
        self.next_reminder_at = anchor + self.reminder_interval();
    }
}
