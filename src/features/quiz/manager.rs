use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::data::models::{CardDirection, CoreError, QuizSession, QUIZ_UNAVAILABLE};
use crate::data::repositories::CardStore;
use crate::features::srs::{apply_answer, due_set, Quality};
use crate::utils::OwnerLocks;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    pub token: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAnswer {
    pub prompt: String,
    pub answer: String,
}

/// One-shot quiz questions kept in memory until revealed or expired
pub struct QuizManager {
    store: Arc<dyn CardStore>,
    sessions: Mutex<HashMap<String, QuizSession>>,
    locks: OwnerLocks,
    ttl: chrono::Duration,
    reveal_grade: Option<Quality>,
}

fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn unavailable() -> CoreError {
    CoreError::NotFound(QUIZ_UNAVAILABLE.into())
}

impl QuizManager {
    pub fn new(store: Arc<dyn CardStore>, ttl: Duration, reveal_grade: Option<Quality>) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            locks: OwnerLocks::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(15)),
            reveal_grade,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, QuizSession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Picks the most urgent card (or a random one when nothing is due)
    /// and asks for one of its sides.
    pub fn issue(&self, owner_id: i64, now: NaiveDateTime) -> Result<QuizQuestion, CoreError> {
        let _guard = self.locks.try_acquire(owner_id)?;

        let card = due_set(self.store.as_ref(), owner_id, now, 1)?
            .into_iter()
            .next()
            .ok_or(CoreError::NoCards)?;

        let direction = if rand::thread_rng().gen_bool(0.5) {
            CardDirection::FrontToBack
        } else {
            CardDirection::BackToFront
        };
        let (prompt, correct_answer) = match direction {
            CardDirection::FrontToBack => (card.front.clone(), card.back.clone()),
            CardDirection::BackToFront => (card.back.clone(), card.front.clone()),
        };

        let session = QuizSession {
            token: new_token(),
            owner_id,
            card_id: card.card_id,
            direction,
            prompt,
            correct_answer,
            created_at: now,
            expires_at: now + self.ttl,
            revealed: false,
        };
        let question = QuizQuestion {
            token: session.token.clone(),
            prompt: session.prompt.clone(),
        };
        self.sessions().insert(session.token.clone(), session);

        log::debug!("User {}: quiz issued for card {}", owner_id, card.card_id);
        Ok(question)
    }

    /// Shows the answer once. Unknown, expired and already revealed tokens
    /// are all `NotFound`; a token of another user is `Forbidden`.
    pub fn reveal(
        &self,
        token: &str,
        requester_id: i64,
        now: NaiveDateTime,
    ) -> Result<QuizAnswer, CoreError> {
        let _guard = self.locks.try_acquire(requester_id)?;

        let session = {
            let mut sessions = self.sessions();
            let session = sessions.get_mut(token).ok_or_else(unavailable)?;
            if session.owner_id != requester_id {
                log::warn!(
                    "User {} tried to reveal a quiz of user {}",
                    requester_id,
                    session.owner_id
                );
                return Err(CoreError::Forbidden);
            }
            if session.revealed || session.is_expired(now) {
                return Err(unavailable());
            }
            session.revealed = true;
            session.clone()
        };

        log::debug!(
            "User {}: quiz on card {} ({:?}) revealed after {}s",
            requester_id,
            session.card_id,
            session.direction,
            (now - session.created_at).num_seconds()
        );
        if let Some(grade) = self.reveal_grade {
            self.grade_revealed(&session, grade, now);
        }

        Ok(QuizAnswer {
            prompt: session.prompt,
            answer: session.correct_answer,
        })
    }

    // The reveal already succeeded; a failed grade is only logged.
    fn grade_revealed(&self, session: &QuizSession, grade: Quality, now: NaiveDateTime) {
        let result = self
            .store
            .card(session.owner_id, session.card_id)
            .and_then(|card| match card {
                Some(card) => self.store.update_card(&apply_answer(&card, grade, now)),
                None => Ok(()),
            });
        if let Err(e) = result {
            log::error!(
                "User {}: failed to grade quiz card {}: {}",
                session.owner_id,
                session.card_id,
                e
            );
        }
    }

    /// Drops every session past its expiry, revealed or not.
    pub fn sweep(&self, now: NaiveDateTime) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= now);
        let removed = before - sessions.len();
        if removed > 0 {
            log::debug!("Removed {} expired quiz sessions", removed);
        }
        removed
    }

    pub fn clear_owner(&self, owner_id: i64) {
        self.sessions().retain(|_, session| session.owner_id != owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repositories::SqliteStore;
    use crate::testing::{pair, t0};
    use chrono::Duration as ChronoDuration;

    const TTL: Duration = Duration::from_secs(900);

    fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory();
        store.upsert_pairs(1, &[pair("hund", "dog")], t0()).unwrap();
        store
    }

    #[test]
    fn issue_asks_one_side_and_reveal_shows_the_other() {
        let store = seeded();
        let quiz = QuizManager::new(Arc::new(store), TTL, None);

        let question = quiz.issue(1, t0()).unwrap();
        assert_eq!(question.token.len(), TOKEN_LEN);
        assert!(question.token.chars().all(|c| c.is_ascii_alphanumeric()));

        let answer = quiz.reveal(&question.token, 1, t0()).unwrap();
        assert_eq!(answer.prompt, question.prompt);
        let mut sides = [answer.prompt, answer.answer];
        sides.sort();
        assert_eq!(sides, ["dog".to_string(), "hund".to_string()]);
    }

    #[test]
    fn second_reveal_is_not_found() {
        let quiz = QuizManager::new(Arc::new(seeded()), TTL, None);
        let question = quiz.issue(1, t0()).unwrap();
        quiz.reveal(&question.token, 1, t0()).unwrap();
        assert!(matches!(
            quiz.reveal(&question.token, 1, t0()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn foreign_requester_is_forbidden_and_does_not_consume_the_token() {
        let quiz = QuizManager::new(Arc::new(seeded()), TTL, None);
        let question = quiz.issue(1, t0()).unwrap();
        assert!(matches!(
            quiz.reveal(&question.token, 2, t0()),
            Err(CoreError::Forbidden)
        ));
        assert!(quiz.reveal(&question.token, 1, t0()).is_ok());
    }

    #[test]
    fn expired_token_is_rejected_and_swept() {
        let quiz = QuizManager::new(Arc::new(seeded()), TTL, None);
        let question = quiz.issue(1, t0()).unwrap();
        let expiry = t0() + ChronoDuration::seconds(900);

        assert_eq!(quiz.sweep(expiry), 0);
        let late = expiry + ChronoDuration::seconds(1);
        assert!(matches!(
            quiz.reveal(&question.token, 1, late),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(quiz.sweep(late), 1);
        assert_eq!(quiz.sweep(late), 0);
    }

    #[test]
    fn unknown_token_and_empty_deck() {
        let quiz = QuizManager::new(Arc::new(SqliteStore::in_memory()), TTL, None);
        assert!(matches!(quiz.issue(1, t0()), Err(CoreError::NoCards)));
        assert!(matches!(
            quiz.reveal("nope", 1, t0()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn reveal_grade_updates_the_card_when_enabled() {
        let store = seeded();
        let quiz = QuizManager::new(Arc::new(store.clone()), TTL, Some(Quality::GOOD));
        let question = quiz.issue(1, t0()).unwrap();
        quiz.reveal(&question.token, 1, t0()).unwrap();

        let card = store.cards(1).unwrap().remove(0);
        assert_eq!(card.repetitions, 1);
        assert_eq!(card.last_reviewed_at, Some(t0()));
    }

    #[test]
    fn reveal_without_grade_leaves_the_card_alone() {
        let store = seeded();
        let quiz = QuizManager::new(Arc::new(store.clone()), TTL, None);
        let question = quiz.issue(1, t0()).unwrap();
        quiz.reveal(&question.token, 1, t0()).unwrap();
        assert_eq!(store.cards(1).unwrap()[0].repetitions, 0);
    }

    #[test]
    fn clear_owner_drops_only_that_owner() {
        let store = seeded();
        store.upsert_pairs(2, &[pair("katze", "cat")], t0()).unwrap();
        let quiz = QuizManager::new(Arc::new(store), TTL, None);
        let mine = quiz.issue(1, t0()).unwrap();
        let theirs = quiz.issue(2, t0()).unwrap();

        quiz.clear_owner(1);
        assert!(quiz.reveal(&mine.token, 1, t0()).is_err());
        assert!(quiz.reveal(&theirs.token, 2, t0()).is_ok());
    }
}
