use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use tera::Context;

use crate::context::AppContext;
use crate::data::models::CoreError;
use crate::features::reminders::overdue::{self, OverdueChoice, OverduePress};
use crate::features::review::AnswerOutcome;
use crate::features::settings::{self, SettingsAction, SettingsField};
use crate::features::srs::Quality;
use crate::handlers::{load_preferences, send_next_prompt, send_settings};

/// Chat clients reject callback data longer than this.
pub const MAX_CALLBACK_DATA: usize = 64;

lazy_static! {
    static ref SETTINGS_ADJUST: Regex = Regex::new(r"^s:(cards|freq):([+-]1)$").unwrap();
    static ref SETTINGS_SET: Regex = Regex::new(r"^s:(cards|freq):set:(\d{1,3})$").unwrap();
    static ref QUIZ_REVEAL: Regex = Regex::new(r"^q:([A-Za-z0-9]{1,62})$").unwrap();
    static ref REVIEW_GRADE: Regex = Regex::new(r"^r:(\d{1,10}):(\d)$").unwrap();
}

/// A button press, decoded once at the edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Settings(SettingsAction),
    QuizReveal(String),
    ReviewGrade { card_id: i32, quality: Quality },
    Overdue(OverduePress),
}

fn field_code(field: SettingsField) -> &'static str {
    match field {
        SettingsField::CardsPerSession => "cards",
        SettingsField::RemindersPerDay => "freq",
    }
}

fn parse_field(code: &str) -> Option<SettingsField> {
    match code {
        "cards" => Some(SettingsField::CardsPerSession),
        "freq" => Some(SettingsField::RemindersPerDay),
        _ => None,
    }
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if data.len() > MAX_CALLBACK_DATA {
            return None;
        }
        match data {
            "s:home" => return Some(CallbackAction::Settings(SettingsAction::Show)),
            "s:close" => return Some(CallbackAction::Settings(SettingsAction::Close)),
            _ => {}
        }

        if let Some(caps) = SETTINGS_ADJUST.captures(data) {
            let field = parse_field(&caps[1])?;
            let delta = if &caps[2] == "+1" { 1 } else { -1 };
            return Some(CallbackAction::Settings(SettingsAction::Adjust { field, delta }));
        }
        if let Some(caps) = SETTINGS_SET.captures(data) {
            let field = parse_field(&caps[1])?;
            let value = caps[2].parse().ok()?;
            return Some(CallbackAction::Settings(SettingsAction::Set { field, value }));
        }
        if let Some(caps) = QUIZ_REVEAL.captures(data) {
            return Some(CallbackAction::QuizReveal(caps[1].to_string()));
        }
        if let Some(caps) = REVIEW_GRADE.captures(data) {
            let card_id = caps[1].parse().ok()?;
            let quality = Quality::new(caps[2].parse().ok()?).ok()?;
            return Some(CallbackAction::ReviewGrade { card_id, quality });
        }
        OverduePress::parse(data).map(CallbackAction::Overdue)
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Settings(SettingsAction::Show) => "s:home".to_string(),
            CallbackAction::Settings(SettingsAction::Close) => "s:close".to_string(),
            CallbackAction::Settings(SettingsAction::Adjust { field, delta }) => {
                let sign = if *delta >= 0 { "+1" } else { "-1" };
                format!("s:{}:{}", field_code(*field), sign)
            }
            CallbackAction::Settings(SettingsAction::Set { field, value }) => {
                format!("s:{}:set:{}", field_code(*field), value)
            }
            CallbackAction::QuizReveal(token) => format!("q:{token}"),
            CallbackAction::ReviewGrade { card_id, quality } => {
                format!("r:{}:{}", card_id, quality.value())
            }
            CallbackAction::Overdue(press) => press.encode(),
        }
    }
}

pub async fn handle_callback(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    data: &str,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let Some(action) = CallbackAction::parse(data) else {
        log::warn!("User {}: ignoring unknown callback data {:?}", owner_id, data);
        return Ok(());
    };

    match action {
        CallbackAction::Settings(action) => handle_settings(ctx, chat_id, owner_id, action, now).await,
        CallbackAction::QuizReveal(token) => {
            let answer = ctx.quiz.reveal(&token, owner_id, now)?;
            let mut context = Context::new();
            context.insert("prompt", &answer.prompt);
            context.insert("answer", &answer.answer);
            ctx.reply(chat_id, ctx.templates.render("quiz_answer.html", &context), Vec::new())
                .await
        }
        CallbackAction::ReviewGrade { card_id, quality } => {
            match ctx.review.submit_answer(owner_id, card_id, quality, now)? {
                AnswerOutcome::Continue { .. } => send_next_prompt(ctx, chat_id, owner_id, now).await,
                AnswerOutcome::Complete { reviewed } => {
                    let mut context = Context::new();
                    context.insert("reviewed", &reviewed);
                    ctx.reply(
                        chat_id,
                        ctx.templates.render("review_complete.html", &context),
                        Vec::new(),
                    )
                    .await
                }
            }
        }
        CallbackAction::Overdue(press) => {
            press.check_fresh(now)?;
            match press.choice {
                OverdueChoice::CatchUp => {
                    ctx.review.start(owner_id, now)?;
                    send_next_prompt(ctx, chat_id, owner_id, now).await
                }
                OverdueChoice::Snooze { days } => {
                    let moved = overdue::snooze(ctx.store.as_ref(), owner_id, days, now)?;
                    let span = if days == 7 { "1 week" } else { "1 day" };
                    ctx.notify(chat_id, &format!("Snoozed {moved} cards for {span}.")).await
                }
            }
        }
    }
}

async fn handle_settings(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    action: SettingsAction,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let prefs = load_preferences(ctx, owner_id, now)?;

    if action == SettingsAction::Close {
        return ctx.notify(chat_id, "Settings saved.").await;
    }

    let updated = settings::apply(&prefs, action, now)?;
    if updated != prefs {
        ctx.store.save_preferences(&updated)?;
        log::info!(
            "User {}: settings now {} reminders/day, {} cards/session",
            owner_id,
            updated.reminders_per_day,
            updated.cards_per_session
        );
    }
    send_settings(ctx, chat_id, &updated).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::data::repositories::{CardStore, SqliteStore};
    use crate::testing::{pair, t0, RecordingMessenger};

    #[test]
    fn parses_every_callback_shape() {
        assert_eq!(
            CallbackAction::parse("s:home"),
            Some(CallbackAction::Settings(SettingsAction::Show))
        );
        assert_eq!(
            CallbackAction::parse("s:cards:-1"),
            Some(CallbackAction::Settings(SettingsAction::Adjust {
                field: SettingsField::CardsPerSession,
                delta: -1
            }))
        );
        assert_eq!(
            CallbackAction::parse("s:freq:set:4"),
            Some(CallbackAction::Settings(SettingsAction::Set {
                field: SettingsField::RemindersPerDay,
                value: 4
            }))
        );
        assert_eq!(
            CallbackAction::parse("q:abcXYZ09"),
            Some(CallbackAction::QuizReveal("abcXYZ09".into()))
        );
        assert_eq!(
            CallbackAction::parse("r:17:4"),
            Some(CallbackAction::ReviewGrade {
                card_id: 17,
                quality: Quality::GOOD
            })
        );
    }

    #[test]
    fn rejects_malformed_and_oversized_data() {
        for data in ["", "s:", "s:cards:+2", "s:volume:+1", "q:", "q:not-alnum", "r:4", "r:1:9", "r:x:4", "r:", "x:1"] {
            assert_eq!(CallbackAction::parse(data), None, "{data}");
        }
        let long = format!("q:{}", "a".repeat(MAX_CALLBACK_DATA));
        assert_eq!(CallbackAction::parse(&long), None);
    }

    #[test]
    fn encoded_actions_parse_back_and_fit_the_limit() {
        let actions = [
            CallbackAction::Settings(SettingsAction::Close),
            CallbackAction::Settings(SettingsAction::Adjust {
                field: SettingsField::RemindersPerDay,
                delta: 1,
            }),
            CallbackAction::Settings(SettingsAction::Set {
                field: SettingsField::CardsPerSession,
                value: 20,
            }),
            CallbackAction::QuizReveal("a".repeat(32)),
            CallbackAction::ReviewGrade {
                card_id: i32::MAX,
                quality: Quality::AGAIN,
            },
            CallbackAction::Overdue(OverduePress {
                choice: OverdueChoice::Snooze { days: 7 },
                issued_at: t0(),
            }),
        ];
        for action in actions {
            let data = action.encode();
            assert!(data.len() <= MAX_CALLBACK_DATA);
            assert_eq!(CallbackAction::parse(&data), Some(action));
        }
    }

    fn context_with_cards() -> (SqliteStore, Arc<RecordingMessenger>, AppContext) {
        let store = SqliteStore::in_memory();
        store.upsert_pairs(1, &[pair("hund", "dog")], t0()).unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let ctx = AppContext::for_tests(Arc::new(store.clone()), messenger.clone());
        (store, messenger, ctx)
    }

    #[tokio::test]
    async fn settings_press_saves_and_redraws() {
        let (store, messenger, ctx) = context_with_cards();
        handle_callback(&ctx, 1, 1, "s:cards:+1", t0()).await.unwrap();

        assert_eq!(store.preferences(1).unwrap().unwrap().cards_per_session, 6);
        let sent = messenger.sent_to(1);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Cards per session: 6"));
        assert!(!sent[0].keyboard.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_setting_is_reported() {
        let (store, _messenger, ctx) = context_with_cards();
        let result = handle_callback(&ctx, 1, 1, "s:freq:set:11", t0()).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(store.preferences(1).unwrap().unwrap().reminders_per_day, 1);
    }

    #[tokio::test]
    async fn grading_the_last_card_completes_the_review() {
        let (store, messenger, ctx) = context_with_cards();
        ctx.review.start(1, t0()).unwrap();
        let prompt = ctx.review.next_prompt(1, t0()).unwrap();

        let data = format!("r:{}:5", prompt.card.card_id);
        handle_callback(&ctx, 1, 1, &data, t0()).await.unwrap();
        assert!(messenger.sent()[0].text.contains("Review complete: 1"));
        assert_eq!(store.cards(1).unwrap()[0].repetitions, 1);
    }

    #[tokio::test]
    async fn second_press_on_an_old_prompt_is_a_conflict() {
        let (store, messenger, ctx) = context_with_cards();
        store.upsert_pairs(1, &[pair("katze", "cat")], t0()).unwrap();
        ctx.review.start(1, t0()).unwrap();
        let first = ctx.review.next_prompt(1, t0()).unwrap();

        let stale = CallbackAction::ReviewGrade {
            card_id: first.card.card_id,
            quality: Quality::EASY,
        }
        .encode();
        handle_callback(&ctx, 1, 1, &stale, t0()).await.unwrap();
        assert_eq!(messenger.sent_to(1).len(), 1);

        let again = handle_callback(&ctx, 1, 1, &stale, t0()).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
        let reviewed = store
            .cards(1)
            .unwrap()
            .into_iter()
            .filter(|c| c.last_reviewed_at.is_some())
            .count();
        assert_eq!(reviewed, 1);
    }

    #[tokio::test]
    async fn overdue_snooze_pushes_due_cards_back() {
        let (store, messenger, ctx) = context_with_cards();
        let now = t0() + chrono::Duration::hours(2);
        let data = OverduePress {
            choice: OverdueChoice::Snooze { days: 1 },
            issued_at: t0(),
        }
        .encode();

        handle_callback(&ctx, 1, 1, &data, now).await.unwrap();
        assert_eq!(store.cards(1).unwrap()[0].due_at, now + chrono::Duration::days(1));
        assert!(messenger.sent_to(1)[0].text.contains("Snoozed 1 cards for 1 day."));
    }

    #[tokio::test]
    async fn overdue_catch_up_starts_a_review() {
        let (_store, messenger, ctx) = context_with_cards();
        let data = OverduePress {
            choice: OverdueChoice::CatchUp,
            issued_at: t0(),
        }
        .encode();

        handle_callback(&ctx, 1, 1, &data, t0()).await.unwrap();
        let sent = messenger.sent_to(1);
        assert!(sent[0].text.contains("hund"));
        assert_eq!(sent[0].keyboard[0].len(), 4);
    }

    #[tokio::test]
    async fn expired_overdue_prompt_changes_nothing() {
        let (store, messenger, ctx) = context_with_cards();
        let data = OverduePress {
            choice: OverdueChoice::Snooze { days: 7 },
            issued_at: t0(),
        }
        .encode();

        let result = handle_callback(&ctx, 1, 1, &data, t0() + chrono::Duration::days(2)).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
        assert_eq!(store.cards(1).unwrap()[0].due_at, t0());
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn quiz_reveal_by_someone_else_is_forbidden() {
        let (_store, _messenger, ctx) = context_with_cards();
        let question = ctx.quiz.issue(1, t0()).unwrap();
        let data = CallbackAction::QuizReveal(question.token).encode();

        let result = handle_callback(&ctx, 2, 2, &data, t0()).await;
        assert!(matches!(result, Err(CoreError::Forbidden)));
    }

    #[tokio::test]
    async fn unknown_data_is_ignored() {
        let (_store, messenger, ctx) = context_with_cards();
        handle_callback(&ctx, 1, 1, "zz:top", t0()).await.unwrap();
        assert!(messenger.sent().is_empty());
    }
}
