use chrono::{DateTime, Duration, NaiveDateTime};

use crate::data::models::CoreError;
use crate::data::repositories::CardStore;
use crate::messaging::Button;

/// How long the buttons of an overdue prompt stay usable.
pub const PROMPT_TTL_HOURS: i64 = 24;

/// What the user picked under an overdue prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueChoice {
    CatchUp,
    Snooze { days: i64 },
}

impl OverdueChoice {
    fn code(self) -> &'static str {
        match self {
            OverdueChoice::CatchUp => "review",
            OverdueChoice::Snooze { days: 7 } => "snooze1w",
            OverdueChoice::Snooze { .. } => "snooze1d",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "review" => Some(OverdueChoice::CatchUp),
            "snooze1d" => Some(OverdueChoice::Snooze { days: 1 }),
            "snooze1w" => Some(OverdueChoice::Snooze { days: 7 }),
            _ => None,
        }
    }
}

/// A pressed overdue button: the choice plus when the prompt was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverduePress {
    pub choice: OverdueChoice,
    pub issued_at: NaiveDateTime,
}

impl OverduePress {
    /// Parses `o:<choice>:<unix seconds>`.
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix("o:")?;
        let (code, secs) = rest.split_once(':')?;
        if secs.is_empty() || secs.len() > 12 || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let issued_at = DateTime::from_timestamp(secs.parse().ok()?, 0)?.naive_utc();
        Some(Self {
            choice: OverdueChoice::from_code(code)?,
            issued_at,
        })
    }

    pub fn encode(&self) -> String {
        format!("o:{}:{}", self.choice.code(), self.issued_at.and_utc().timestamp())
    }

    /// Rejects presses on prompts older than [`PROMPT_TTL_HOURS`].
    pub fn check_fresh(&self, now: NaiveDateTime) -> Result<(), CoreError> {
        if now - self.issued_at > Duration::hours(PROMPT_TTL_HOURS) {
            return Err(CoreError::NotFound(
                "This reminder has expired. Send /review to practice.".into(),
            ));
        }
        Ok(())
    }
}

pub fn overdue_keyboard(now: NaiveDateTime) -> Vec<Vec<Button>> {
    let press = |text: &str, choice| {
        Button::new(text, OverduePress { choice, issued_at: now }.encode())
    };
    vec![
        vec![press("Review now", OverdueChoice::CatchUp)],
        vec![
            press("Snooze 1 day", OverdueChoice::Snooze { days: 1 }),
            press("Snooze 1 week", OverdueChoice::Snooze { days: 7 }),
        ],
    ]
}

/// Pushes every card due at `now` forward by `days`. Returns how many moved.
pub fn snooze(
    store: &dyn CardStore,
    owner_id: i64,
    days: i64,
    now: NaiveDateTime,
) -> Result<usize, CoreError> {
    let moved = store.postpone_due_cards(owner_id, now, now + Duration::days(days))?;
    log::info!("User {}: snoozed {} cards for {} day(s)", owner_id, moved, days);
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repositories::SqliteStore;
    use crate::testing::{pair, t0};

    #[test]
    fn presses_parse_back_from_the_keyboard() {
        let keyboard = overdue_keyboard(t0());
        let presses: Vec<OverduePress> = keyboard
            .iter()
            .flatten()
            .map(|b| OverduePress::parse(&b.callback_data).unwrap())
            .collect();
        let choices: Vec<OverdueChoice> = presses.iter().map(|p| p.choice).collect();
        assert_eq!(
            choices,
            vec![
                OverdueChoice::CatchUp,
                OverdueChoice::Snooze { days: 1 },
                OverdueChoice::Snooze { days: 7 },
            ]
        );
        assert!(presses.iter().all(|p| p.issued_at == t0()));
    }

    #[test]
    fn rejects_malformed_presses() {
        for data in ["o:", "o:review", "o:review:", "o:nap:100", "o:review:-5", "o:review:1e9", "r:1:4"] {
            assert_eq!(OverduePress::parse(data), None, "{data}");
        }
    }

    #[test]
    fn prompt_expires_after_a_day() {
        let press = OverduePress {
            choice: OverdueChoice::CatchUp,
            issued_at: t0(),
        };
        assert!(press.check_fresh(t0() + Duration::hours(24)).is_ok());
        assert!(matches!(
            press.check_fresh(t0() + Duration::hours(25)),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn snooze_moves_due_cards_past_the_delay() {
        let store = SqliteStore::in_memory();
        store.upsert_pairs(1, &[pair("a", "1"), pair("b", "2")], t0()).unwrap();

        let now = t0() + Duration::hours(1);
        assert_eq!(snooze(&store, 1, 7, now).unwrap(), 2);
        assert_eq!(store.count_due_cards(1, now + Duration::days(6)).unwrap(), 0);
        assert_eq!(store.count_due_cards(1, now + Duration::days(7)).unwrap(), 2);
    }
}
