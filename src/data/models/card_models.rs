use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};
use serde::Serialize;

use crate::schema::cards;

/// Ease factor every new card starts with.
pub const DEFAULT_EASE: f64 = 2.5;

/// Lower bound for the ease factor.
pub const EASE_FLOOR: f64 = 1.3;

/// A vocabulary pair together with its spaced-repetition state
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = cards)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Card {
    pub card_id: i32,
    pub owner_id: i64,
    pub front: String,                          // Word in the studied language
    pub back: String,                           // Translation
    pub ease_factor: f64,                       // SM-2 multiplier, never below EASE_FLOOR
    pub interval_days: i32,                     // Days between the last and the next review
    pub repetitions: i32,                       // Consecutive correct answers
    pub due_at: NaiveDateTime,                  // Next scheduled review
    pub last_reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Card {
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.due_at <= now
    }
}

#[derive(Insertable)]
#[diesel(table_name = cards)]
pub struct NewCard<'a> {
    pub owner_id: i64,
    pub front: &'a str,
    pub back: &'a str,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub repetitions: i32,
    pub due_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl<'a> NewCard<'a> {
    /// A fresh card is due right away so the next review can pick it up.
    pub fn fresh(owner_id: i64, front: &'a str, back: &'a str, now: NaiveDateTime) -> Self {
        Self {
            owner_id,
            front,
            back,
            ease_factor: DEFAULT_EASE,
            interval_days: 0,
            repetitions: 0,
            due_at: now,
            created_at: now,
        }
    }
}

/// A front/back pair parsed from user input, before it becomes a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPair {
    pub front: String,
    pub back: String,
}
