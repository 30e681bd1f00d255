use chrono::NaiveDateTime;
use validator::Validate;

use crate::data::models::{CoreError, StoreError, UserPreferences};
use crate::data::repositories::CardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    CardsPerSession,
    RemindersPerDay,
}

/// A press on the settings keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    Show,
    Adjust { field: SettingsField, delta: i32 },
    Set { field: SettingsField, value: i32 },
    Close,
}

/// Returns the preferences after `action`. Out-of-range values are a
/// validation error and leave `prefs` as they were. A new reminder
/// frequency is counted from the last reminder actually sent.
pub fn apply(
    prefs: &UserPreferences,
    action: SettingsAction,
    now: NaiveDateTime,
) -> Result<UserPreferences, CoreError> {
    let (field, value) = match action {
        SettingsAction::Show | SettingsAction::Close => return Ok(prefs.clone()),
        SettingsAction::Adjust { field, delta } => {
            let current = match field {
                SettingsField::CardsPerSession => prefs.cards_per_session,
                SettingsField::RemindersPerDay => prefs.reminders_per_day,
            };
            (field, current.saturating_add(delta))
        }
        SettingsAction::Set { field, value } => (field, value),
    };

    let mut updated = prefs.clone();
    match field {
        SettingsField::CardsPerSession => updated.cards_per_session = value,
        SettingsField::RemindersPerDay => updated.reminders_per_day = value,
    }
    updated.validate()?;

    if updated.reminders_per_day != prefs.reminders_per_day {
        updated.reschedule(now);
    }
    Ok(updated)
}

/// Loads the owner's preferences, creating them with the defaults on
/// first use.
pub fn load_or_create(
    store: &dyn CardStore,
    owner_id: i64,
    reminders_per_day: i32,
    cards_per_session: i32,
    now: NaiveDateTime,
) -> Result<UserPreferences, StoreError> {
    if let Some(prefs) = store.preferences(owner_id)? {
        return Ok(prefs);
    }
    let prefs = UserPreferences::new(owner_id, reminders_per_day, cards_per_session, now);
    store.save_preferences(&prefs)?;
    log::info!("User {}: preferences created", owner_id);
    Ok(prefs)
}
