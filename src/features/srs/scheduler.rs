use chrono::{Duration, NaiveDateTime};

use crate::data::models::{Card, CoreError, StoreError, EASE_FLOOR};
use crate::data::repositories::CardStore;

/// Longest gap between two reviews, about a century.
pub const MAX_INTERVAL_DAYS: i32 = 36_500;

/// Answer grade on the SM-2 0..=5 scale. Anything below 3 counts as a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const AGAIN: Quality = Quality(0);
    pub const HARD: Quality = Quality(3);
    pub const GOOD: Quality = Quality(4);
    pub const EASY: Quality = Quality(5);

    pub fn new(value: u8) -> Result<Self, CoreError> {
        if value > 5 {
            return Err(CoreError::Validation(format!(
                "Grade must be between 0 and 5, got {value}"
            )));
        }
        Ok(Quality(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_correct(self) -> bool {
        self.0 >= 3
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0..=2 => "Again",
            3 => "Hard",
            4 => "Good",
            _ => "Easy",
        }
    }
}

/// Applies one answer to a card and returns its next review state (SM-2).
///
/// A miss resets the streak and schedules the card for tomorrow without
/// touching the ease factor. A hit grows the interval 1, 6, then
/// `previous × ease`, and nudges the ease by the grade.
pub fn apply_answer(card: &Card, quality: Quality, now: NaiveDateTime) -> Card {
    let mut next = card.clone();

    if quality.is_correct() {
        next.repetitions = card.repetitions.saturating_add(1);
        next.interval_days = match next.repetitions {
            1 => 1,
            2 => 6,
            _ => (f64::from(card.interval_days) * card.ease_factor).round() as i32,
        }
        .min(MAX_INTERVAL_DAYS);

        let miss = f64::from(5 - quality.value());
        next.ease_factor = (card.ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(EASE_FLOOR);
    } else {
        next.repetitions = 0;
        next.interval_days = 1;
    }

    next.last_reviewed_at = Some(now);
    next.due_at = now + Duration::days(i64::from(next.interval_days));
    next
}

/// Cards to practice right now: due cards first (earliest due, then lowest
/// id), topped up with random not-yet-due cards when fewer than `limit`
/// are due.
pub fn due_set(
    store: &dyn CardStore,
    owner_id: i64,
    now: NaiveDateTime,
    limit: usize,
) -> Result<Vec<Card>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut selected = store.due_cards(owner_id, now, limit)?;
    if selected.len() < limit {
        let fill = store.random_not_due_cards(owner_id, now, limit - selected.len())?;
        log::debug!(
            "User {}: {} due cards, {} fallback cards",
            owner_id,
            selected.len(),
            fill.len()
        );
        selected.extend(fill);
    }
    Ok(selected)
}
