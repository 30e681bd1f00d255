use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::config::AppConfig;
use crate::data::models::CoreError;
use crate::data::repositories::CardStore;
use crate::features::quiz::QuizManager;
use crate::features::reminders::ReminderDispatcher;
use crate::features::review::ReviewManager;
use crate::messaging::{Button, Messenger, OutgoingMessage};
use crate::utils::Templates;

/// Everything a request or a background loop needs, built once in `main`
/// and shared as axum state.
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn CardStore>,
    pub messenger: Arc<dyn Messenger>,
    pub templates: Arc<Templates>,
    pub review: ReviewManager,
    pub quiz: QuizManager,
    pub reminders: ReminderDispatcher,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CardStore>,
        messenger: Arc<dyn Messenger>,
        templates: Arc<Templates>,
    ) -> Self {
        let cards_per_session = usize::try_from(config.default_cards_per_session).unwrap_or(5);
        let review = ReviewManager::new(store.clone(), config.review_idle_timeout, cards_per_session);
        let quiz = QuizManager::new(store.clone(), config.quiz_ttl, config.quiz_reveal_grade);
        let reminders = ReminderDispatcher::new(store.clone(), messenger.clone(), templates.clone());
        Self {
            config,
            store,
            messenger,
            templates,
            review,
            quiz,
            reminders,
        }
    }

    /// Sends an already rendered message.
    pub async fn reply(
        &self,
        chat_id: i64,
        text: String,
        keyboard: Vec<Vec<Button>>,
    ) -> Result<(), CoreError> {
        self.messenger
            .send(OutgoingMessage::text(chat_id, text).with_keyboard(keyboard))
            .await?;
        Ok(())
    }

    /// Sends plain text, escaped for the HTML parse mode.
    pub async fn notify(&self, chat_id: i64, text: &str) -> Result<(), CoreError> {
        self.reply(chat_id, self.templates.notice(text), Vec::new()).await
    }

    /// Records that the user did something. A paused user is told their
    /// reminders are back. Failures are logged, never surfaced.
    pub async fn record_activity(&self, chat_id: i64, owner_id: i64, now: NaiveDateTime) {
        match self.store.record_activity(owner_id, now) {
            Ok(true) => {
                log::info!("User {}: back after a pause, reminders resumed", owner_id);
                if let Err(e) = self.notify(chat_id, "Welcome back! Your reminders are on again.").await {
                    log::warn!("User {}: failed to send resume notice: {}", owner_id, e);
                }
            }
            Ok(false) => {}
            Err(e) => log::error!("User {}: failed to record activity: {}", owner_id, e),
        }
    }

    /// Tells the user what went wrong. Store and delivery failures are
    /// logged as errors, everything else is an expected outcome.
    pub async fn report_error(&self, chat_id: i64, owner_id: i64, err: CoreError) {
        if err.is_boundary() {
            log::error!("User {}: {}", owner_id, err);
        } else {
            log::debug!("User {}: {}", owner_id, err);
        }
        if let Err(e) = self.notify(chat_id, &err.user_message()).await {
            log::error!("User {}: failed to deliver error reply: {}", owner_id, e);
        }
    }

    #[cfg(test)]
    pub fn for_tests(store: Arc<dyn CardStore>, messenger: Arc<dyn Messenger>) -> Self {
        let templates = Templates::load().expect("templates");
        Self::new(AppConfig::for_tests(), store, messenger, Arc::new(templates))
    }
}
