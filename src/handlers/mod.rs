pub mod callback;
pub mod commands;
pub mod webhook;

use chrono::NaiveDateTime;
use tera::Context;

use crate::context::AppContext;
use crate::data::models::{CoreError, UserPreferences};
use crate::features::settings::{self, SettingsAction, SettingsField};
use crate::features::srs::Quality;
use crate::messaging::Button;
use callback::CallbackAction;

pub use webhook::{health, telegram_webhook};

fn button(text: &str, action: CallbackAction) -> Button {
    Button::new(text, action.encode())
}

/// Grade buttons bound to the card they are shown under.
pub fn review_keyboard(card_id: i32) -> Vec<Vec<Button>> {
    vec![[Quality::AGAIN, Quality::HARD, Quality::GOOD, Quality::EASY]
        .into_iter()
        .map(|quality| button(quality.label(), CallbackAction::ReviewGrade { card_id, quality }))
        .collect()]
}

pub fn settings_keyboard() -> Vec<Vec<Button>> {
    let adjust = |field, delta| CallbackAction::Settings(SettingsAction::Adjust { field, delta });
    vec![
        vec![
            button("Reminders -", adjust(SettingsField::RemindersPerDay, -1)),
            button("Reminders +", adjust(SettingsField::RemindersPerDay, 1)),
        ],
        vec![
            button("Cards -", adjust(SettingsField::CardsPerSession, -1)),
            button("Cards +", adjust(SettingsField::CardsPerSession, 1)),
        ],
        vec![button("Done", CallbackAction::Settings(SettingsAction::Close))],
    ]
}

/// The owner's preferences, created with the configured defaults on
/// first use.
pub fn load_preferences(
    ctx: &AppContext,
    owner_id: i64,
    now: NaiveDateTime,
) -> Result<UserPreferences, CoreError> {
    let prefs = settings::load_or_create(
        ctx.store.as_ref(),
        owner_id,
        ctx.config.default_reminders_per_day,
        ctx.config.default_cards_per_session,
        now,
    )?;
    Ok(prefs)
}

/// Moves the review on to its next card and shows it with grade buttons.
pub async fn send_next_prompt(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let prompt = ctx.review.next_prompt(owner_id, now)?;

    let mut context = Context::new();
    context.insert("number", &prompt.number);
    context.insert("total", &prompt.total);
    context.insert("shown", &prompt.card.front);
    context.insert("expected", &prompt.card.back);
    ctx.reply(
        chat_id,
        ctx.templates.render("review_prompt.html", &context),
        review_keyboard(prompt.card.card_id),
    )
    .await
}

pub async fn send_settings(
    ctx: &AppContext,
    chat_id: i64,
    prefs: &UserPreferences,
) -> Result<(), CoreError> {
    let mut context = Context::new();
    context.insert("reminders_per_day", &prefs.reminders_per_day);
    context.insert("cards_per_session", &prefs.cards_per_session);
    context.insert(
        "next_reminder_at",
        &prefs.next_reminder_at.format("%Y-%m-%d %H:%M").to_string(),
    );
    ctx.reply(
        chat_id,
        ctx.templates.render("settings.html", &context),
        settings_keyboard(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::callback::MAX_CALLBACK_DATA;

    #[test]
    fn review_keyboard_carries_the_named_grades() {
        let data: Vec<String> = review_keyboard(12)
            .concat()
            .into_iter()
            .map(|b| b.callback_data)
            .collect();
        assert_eq!(data, ["r:12:0", "r:12:3", "r:12:4", "r:12:5"]);
    }

    #[test]
    fn settings_buttons_parse_back() {
        for button in settings_keyboard().concat() {
            assert!(button.callback_data.len() <= MAX_CALLBACK_DATA);
            assert!(CallbackAction::parse(&button.callback_data).is_some());
        }
    }
}
