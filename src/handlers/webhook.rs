use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::context::AppContext;
use crate::handlers::{callback, commands};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

// Incoming Bot API objects, reduced to the fields the bot reads.

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        let name = match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        };
        let name = name.trim();
        match (&self.username, name.is_empty()) {
            (Some(username), false) => format!("{name} (@{username})"),
            (Some(username), true) => format!("@{username}"),
            (None, false) => name.to_string(),
            (None, true) => format!("User {}", self.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub document: Option<Document>,
}

/// The message a button was attached to; may be too old to be accessible
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMessage {
    pub chat: Chat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<CallbackMessage>,
    pub data: Option<String>,
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Secret token mismatch")]
    Unauthorized,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        }
        .into_response()
    }
}

#[axum::debug_handler]
pub async fn telegram_webhook(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<StatusCode, WebhookError> {
    if let Some(secret) = &ctx.config.webhook_secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_str()) {
            log::warn!("Rejected update {}: bad secret token", update.update_id);
            return Err(WebhookError::Unauthorized);
        }
    }

    dispatch(&ctx, update, Utc::now().naive_utc()).await;
    Ok(StatusCode::OK)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Routes one update to the command or callback handlers. Failures are
/// reported to the user and logged; they never fail the webhook call.
pub async fn dispatch(ctx: &AppContext, update: Update, now: NaiveDateTime) {
    if let Some(query) = update.callback_query {
        if let Err(e) = ctx.messenger.answer_callback(&query.id).await {
            log::warn!("User {}: failed to answer callback: {}", query.from.id, e);
        }
        let chat_id = query
            .message
            .as_ref()
            .map_or(query.from.id, |message| message.chat.id);
        ctx.record_activity(chat_id, query.from.id, now).await;
        let Some(data) = query.data.as_deref() else {
            return;
        };
        if let Err(e) = callback::handle_callback(ctx, chat_id, query.from.id, data, now).await {
            ctx.report_error(chat_id, query.from.id, e).await;
        }
    } else if let Some(message) = update.message {
        let Some(from) = message.from.clone() else {
            log::debug!("Ignoring update {} without a sender", update.update_id);
            return;
        };
        ctx.record_activity(message.chat.id, from.id, now).await;
        if let Err(e) = commands::handle_message(ctx, &message, &from, now).await {
            ctx.report_error(message.chat.id, from.id, e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::{UserPreferences, PAUSE_AFTER_MISSES};
    use crate::data::repositories::{CardStore, SqliteStore};
    use crate::testing::{pair, t0, RecordingMessenger};
    use serde_json::json;

    fn setup() -> (Arc<RecordingMessenger>, AppContext) {
        let store = SqliteStore::in_memory();
        store.upsert_pairs(1, &[pair("hund", "dog")], t0()).unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let ctx = AppContext::for_tests(Arc::new(store), messenger.clone());
        (messenger, ctx)
    }

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn display_name_prefers_full_name_with_username() {
        let user: User = serde_json::from_value(json!({
            "id": 5, "first_name": "Ann", "last_name": "Lee", "username": "ann"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "Ann Lee (@ann)");

        let bare: User = serde_json::from_value(json!({ "id": 5 })).unwrap();
        assert_eq!(bare.display_name(), "User 5");
    }

    #[tokio::test]
    async fn callback_is_acknowledged_and_routed() {
        let (messenger, ctx) = setup();
        let question = ctx.quiz.issue(1, t0()).unwrap();
        dispatch(
            &ctx,
            update(json!({
                "update_id": 1,
                "callback_query": {
                    "id": "cb-1",
                    "from": { "id": 1, "first_name": "Ann" },
                    "message": { "message_id": 3, "chat": { "id": 1, "type": "private" } },
                    "data": format!("q:{}", question.token)
                }
            })),
            t0(),
        )
        .await;

        assert_eq!(messenger.answered_callbacks(), ["cb-1"]);
        assert!(messenger.sent_to(1)[0].text.contains(&question.prompt));
    }

    #[tokio::test]
    async fn handler_errors_become_replies() {
        let (messenger, ctx) = setup();
        dispatch(
            &ctx,
            update(json!({
                "update_id": 2,
                "callback_query": {
                    "id": "cb-2",
                    "from": { "id": 1, "first_name": "Ann" },
                    "data": "q:unknowntoken"
                }
            })),
            t0(),
        )
        .await;

        let sent = messenger.sent_to(1);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("no longer available"));
    }

    #[tokio::test]
    async fn paused_user_is_resumed_by_any_message() {
        let store = SqliteStore::in_memory();
        let mut prefs = UserPreferences::new(1, 1, 5, t0());
        prefs.reminders_paused = true;
        prefs.missed_reminders = PAUSE_AFTER_MISSES;
        store.save_preferences(&prefs).unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let ctx = AppContext::for_tests(Arc::new(store.clone()), messenger.clone());

        let now = t0() + chrono::Duration::days(12);
        dispatch(
            &ctx,
            update(json!({
                "update_id": 4,
                "message": {
                    "message_id": 1,
                    "from": { "id": 1, "first_name": "Ann" },
                    "chat": { "id": 1, "type": "private" },
                    "text": "/help"
                }
            })),
            now,
        )
        .await;

        let sent = messenger.sent_to(1);
        assert!(sent[0].text.contains("Welcome back! Your reminders are on again."));
        assert_eq!(sent.len(), 2);
        let prefs = store.preferences(1).unwrap().unwrap();
        assert!(!prefs.reminders_paused);
        assert_eq!(prefs.missed_reminders, 0);
        assert_eq!(prefs.last_active_at, Some(now));
    }

    #[tokio::test]
    async fn message_without_sender_is_ignored() {
        let (messenger, ctx) = setup();
        dispatch(
            &ctx,
            update(json!({
                "update_id": 3,
                "message": { "message_id": 1, "chat": { "id": -100, "type": "channel" }, "text": "/help" }
            })),
            t0(),
        )
        .await;
        assert!(messenger.sent().is_empty());
    }
}
