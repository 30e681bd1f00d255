use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::data::models::{Card, CoreError, ReviewSession, ReviewState, StoreError};
use crate::data::repositories::CardStore;
use crate::features::srs::{apply_answer, due_set, Quality};
use crate::utils::OwnerLocks;

/// The card a user has to answer next
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPrompt {
    pub card: Card,
    pub number: usize, // 1-based position in the queue
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Continue { remaining: usize },
    Complete { reviewed: usize },
}

/// Drives review sessions: `start` → `next_prompt` → `submit_answer` → ...
///
/// Sessions live in the store so they survive restarts. Each owner has at
/// most one; concurrent requests for the same owner are rejected by the
/// in-process lock, and the store double-checks every transition with a
/// compare-and-set so a concurrent `cancel` can never be half-applied.
pub struct ReviewManager {
    store: Arc<dyn CardStore>,
    locks: OwnerLocks,
    idle_timeout: chrono::Duration,
    default_cards_per_session: usize,
}

fn no_session() -> CoreError {
    CoreError::NotFound("No review in progress. Send /review to start one.".into())
}

impl ReviewManager {
    pub fn new(
        store: Arc<dyn CardStore>,
        idle_timeout: Duration,
        default_cards_per_session: usize,
    ) -> Self {
        Self {
            store,
            locks: OwnerLocks::new(),
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
            default_cards_per_session,
        }
    }

    pub fn start(&self, owner_id: i64, now: NaiveDateTime) -> Result<ReviewSession, CoreError> {
        let _guard = self.locks.try_acquire(owner_id)?;

        if let Some(existing) = self.store.review_session(owner_id)? {
            if !existing.is_idle(now, self.idle_timeout) {
                return Err(CoreError::Conflict(
                    "You already have a review in progress. Answer the current card or send /cancel."
                        .into(),
                ));
            }
            log::info!(
                "User {}: replacing review session idle since {}",
                owner_id,
                existing.last_activity_at
            );
            self.store.delete_review_session(owner_id)?;
        }

        let limit = self
            .store
            .preferences(owner_id)?
            .and_then(|p| usize::try_from(p.cards_per_session).ok())
            .unwrap_or(self.default_cards_per_session);

        let cards = due_set(self.store.as_ref(), owner_id, now, limit)?;
        if cards.is_empty() {
            return Err(CoreError::NoCards);
        }

        let session = ReviewSession::new(owner_id, cards.iter().map(|c| c.card_id).collect(), now);
        if !self.store.insert_review_session(&session)? {
            return Err(CoreError::Conflict(
                "You already have a review in progress.".into(),
            ));
        }

        log::info!("User {}: review started with {} cards", owner_id, session.card_queue.len());
        Ok(session)
    }

    pub fn next_prompt(&self, owner_id: i64, now: NaiveDateTime) -> Result<ReviewPrompt, CoreError> {
        let _guard = self.locks.try_acquire(owner_id)?;

        let mut session = self.store.review_session(owner_id)?.ok_or_else(no_session)?;
        if session.state != ReviewState::InProgress {
            return Err(CoreError::NotFound(
                "The current card is still waiting for your rating.".into(),
            ));
        }
        let expected_position = session.position;

        // Cards deleted after the session started are skipped.
        let card = loop {
            let Some(card_id) = session.current_card_id() else {
                self.store.delete_review_session(owner_id)?;
                return Err(CoreError::NotFound(
                    "Nothing left to review in this session.".into(),
                ));
            };
            match self.store.card(owner_id, card_id)? {
                Some(card) => break card,
                None => {
                    log::debug!("User {}: card {} vanished from review", owner_id, card_id);
                    session.position += 1;
                }
            }
        };

        session.state = ReviewState::AwaitingAnswer;
        session.last_activity_at = now;
        if !self
            .store
            .update_review_session(&session, ReviewState::InProgress, expected_position)?
        {
            return Err(CoreError::Conflict("Your review changed in the meantime.".into()));
        }

        Ok(ReviewPrompt {
            card,
            number: session.position + 1,
            total: session.card_queue.len(),
        })
    }

    /// Grades the card on screen. `card_id` is the card the grade was
    /// given for; a grade for any other card is a `Conflict` and changes
    /// nothing.
    pub fn submit_answer(
        &self,
        owner_id: i64,
        card_id: i32,
        quality: Quality,
        now: NaiveDateTime,
    ) -> Result<AnswerOutcome, CoreError> {
        let _guard = self.locks.try_acquire(owner_id)?;

        let session = self.store.review_session(owner_id)?.ok_or_else(no_session)?;
        if session.state != ReviewState::AwaitingAnswer {
            return Err(CoreError::NotFound("There is no card waiting for an answer.".into()));
        }
        let current = session.current_card_id().ok_or_else(|| {
            StoreError::Corrupt(format!("review position {} past queue end", session.position))
        })?;
        if current != card_id {
            log::debug!(
                "User {}: stale grade for card {}, card {} is on screen",
                owner_id,
                card_id,
                current
            );
            return Err(CoreError::Conflict(
                "That card was already rated. Please use the buttons under the latest card.".into(),
            ));
        }

        let mut next = session.clone();
        next.position += 1;
        next.state = ReviewState::InProgress;
        next.last_activity_at = now;
        let complete = next.is_exhausted();
        let next_row = if complete { None } else { Some(&next) };

        let committed = match self.store.card(owner_id, card_id)? {
            Some(card) => {
                let graded = apply_answer(&card, quality, now);
                self.store.commit_answer(&graded, session.position, next_row)?
            }
            // Deleted while on screen: advance without grading.
            None => match next_row {
                Some(next) => self.store.update_review_session(
                    next,
                    ReviewState::AwaitingAnswer,
                    session.position,
                )?,
                None => self.store.delete_review_session(owner_id)?,
            },
        };

        if !committed {
            return Err(CoreError::Conflict(
                "Your review changed in the meantime. Send /review to continue.".into(),
            ));
        }

        log::debug!(
            "User {}: card {} graded {} ({}/{})",
            owner_id,
            card_id,
            quality.value(),
            next.position,
            next.card_queue.len()
        );

        if complete {
            log::info!("User {}: review complete", owner_id);
            Ok(AnswerOutcome::Complete {
                reviewed: next.card_queue.len(),
            })
        } else {
            Ok(AnswerOutcome::Continue {
                remaining: next.remaining(),
            })
        }
    }

    /// Drops the owner's session whatever its state. Does not take the
    /// owner lock: an answer committing at the same time either lands
    /// before the delete or fails its compare-and-set.
    pub fn cancel(&self, owner_id: i64) -> Result<bool, CoreError> {
        let existed = self.store.delete_review_session(owner_id)?;
        if existed {
            log::info!("User {}: review cancelled", owner_id);
        }
        Ok(existed)
    }

    /// Removes sessions abandoned for longer than the idle timeout.
    pub fn sweep_idle(&self, now: NaiveDateTime) -> Result<usize, CoreError> {
        let removed = self.store.delete_idle_review_sessions(now - self.idle_timeout)?;
        if removed > 0 {
            log::info!("Removed {} idle review sessions", removed);
        }
        Ok(removed)
    }
}
