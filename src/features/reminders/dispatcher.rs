use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tera::Context;

use crate::data::models::{CoreError, UserPreferences, PAUSE_AFTER_MISSES};
use crate::data::repositories::CardStore;
use crate::features::reminders::overdue::overdue_keyboard;
use crate::features::srs::due_set;
use crate::messaging::{Messenger, OutgoingMessage};
use crate::utils::Templates;

/// No reminder while the user graded a card this recently.
const REVIEW_GRACE_MINUTES: i64 = 15;

const PAUSED_NOTICE: &str =
    "Reminders are paused because you have not answered in a while. Send any message to resume.";

/// What one dispatcher pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub skipped: usize,
    pub paused: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Skipped,
    Paused,
}

/// Sends scheduled reminder batches to every user whose slot has come.
pub struct ReminderDispatcher {
    store: Arc<dyn CardStore>,
    messenger: Arc<dyn Messenger>,
    templates: Arc<Templates>,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn CardStore>,
        messenger: Arc<dyn Messenger>,
        templates: Arc<Templates>,
    ) -> Self {
        Self {
            store,
            messenger,
            templates,
        }
    }

    /// One pass over the due users. A user gets at most one reminder per
    /// pass, however many slots were missed. Failures are counted and
    /// logged per user; only a failure to list the due users aborts.
    pub async fn tick(&self, now: NaiveDateTime) -> Result<TickReport, CoreError> {
        let due = self.store.preferences_due(now)?;
        let mut report = TickReport::default();

        for prefs in due {
            let owner_id = prefs.owner_id;
            match self.remind(prefs, now).await {
                Ok(Outcome::Sent) => report.sent += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Paused) => report.paused += 1,
                Err(e) => {
                    log::error!("User {}: reminder failed: {}", owner_id, e);
                    report.failed += 1;
                }
            }
        }

        if report != TickReport::default() {
            log::info!(
                "Reminders: {} sent, {} skipped, {} paused, {} failed",
                report.sent,
                report.skipped,
                report.paused,
                report.failed
            );
        }
        Ok(report)
    }

    // Skipped leaves the schedule as it is.
    async fn remind(&self, mut prefs: UserPreferences, now: NaiveDateTime) -> Result<Outcome, CoreError> {
        let owner_id = prefs.owner_id;
        if let Some(session) = self.store.review_session(owner_id)? {
            if now - session.last_activity_at < Duration::minutes(REVIEW_GRACE_MINUTES) {
                log::debug!("User {}: reviewing right now, reminder skipped", owner_id);
                return Ok(Outcome::Skipped);
            }
        }

        let missed = prefs.missed_so_far();
        if missed >= PAUSE_AFTER_MISSES {
            prefs.missed_reminders = missed;
            prefs.reminders_paused = true;
            self.store.save_preferences(&prefs)?;
            log::info!("User {}: {} reminders unanswered, pausing", owner_id, missed);
            let notice = OutgoingMessage::text(owner_id, self.templates.notice(PAUSED_NOTICE));
            if let Err(e) = self.messenger.send(notice).await {
                log::warn!("User {}: failed to send pause notice: {}", owner_id, e);
            }
            return Ok(Outcome::Paused);
        }

        let limit = usize::try_from(prefs.cards_per_session).unwrap_or(1);
        let cards = due_set(self.store.as_ref(), owner_id, now, limit)?;
        if cards.is_empty() {
            log::debug!("User {}: no cards, reminder skipped", owner_id);
            return Ok(Outcome::Skipped);
        }

        let overdue = self.store.count_due_cards(owner_id, now)?;
        let capacity = i64::from(prefs.cards_per_session) * i64::from(prefs.reminders_per_day);
        if overdue > capacity {
            log::debug!("User {}: {} overdue, over daily capacity {}", owner_id, overdue, capacity);
            let mut context = Context::new();
            context.insert("overdue", &overdue);
            context.insert("capacity", &capacity);
            let text = self.templates.render("overdue.html", &context);
            self.messenger
                .send(OutgoingMessage::text(owner_id, text).with_keyboard(overdue_keyboard(now)))
                .await?;
            self.record_sent(prefs, missed, now)?;
            return Ok(Outcome::Sent);
        }

        log::debug!(
            "User {}: reminding {} cards, {} of them due",
            prefs.owner_id,
            cards.len(),
            cards.iter().filter(|c| c.is_due(now)).count()
        );
        let mut context = Context::new();
        context.insert("cards", &cards);
        let text = self.templates.render("reminder.html", &context);
        self.messenger
            .send(OutgoingMessage::text(prefs.owner_id, text))
            .await?;

        self.record_sent(prefs, missed, now)?;
        Ok(Outcome::Sent)
    }

    fn record_sent(&self, mut prefs: UserPreferences, missed: i32, now: NaiveDateTime) -> Result<(), CoreError> {
        prefs.missed_reminders = missed;
        prefs.mark_sent(now);
        self.store.save_preferences(&prefs)?;
        Ok(())
    }
}
