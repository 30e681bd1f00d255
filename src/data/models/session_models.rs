use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};

use crate::data::models::StoreError;
use crate::schema::review_sessions;

/// Persisted review states. `Complete` and `Abandoned` are terminal and
/// never stored: the row is deleted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    InProgress,
    AwaitingAnswer,
}

impl ReviewState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewState::InProgress => "in_progress",
            ReviewState::AwaitingAnswer => "awaiting_answer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(ReviewState::InProgress),
            "awaiting_answer" => Some(ReviewState::AwaitingAnswer),
            _ => None,
        }
    }
}

/// A user's review run over a fixed queue of card ids
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSession {
    pub owner_id: i64,
    pub card_queue: Vec<i32>,
    pub position: usize,
    pub state: ReviewState,
    pub started_at: NaiveDateTime,
    pub last_activity_at: NaiveDateTime,
}

impl ReviewSession {
    pub fn new(owner_id: i64, card_queue: Vec<i32>, now: NaiveDateTime) -> Self {
        Self {
            owner_id,
            card_queue,
            position: 0,
            state: ReviewState::InProgress,
            started_at: now,
            last_activity_at: now,
        }
    }

    pub fn current_card_id(&self) -> Option<i32> {
        self.card_queue.get(self.position).copied()
    }

    pub fn remaining(&self) -> usize {
        self.card_queue.len().saturating_sub(self.position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.card_queue.len()
    }

    pub fn is_idle(&self, now: NaiveDateTime, timeout: chrono::Duration) -> bool {
        now - self.last_activity_at > timeout
    }
}

/// Database row of a review session; the queue is kept as a JSON array
#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = review_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReviewSessionRow {
    pub owner_id: i64,
    pub card_queue: String,
    pub position: i32,
    pub state: String,
    pub started_at: NaiveDateTime,
    pub last_activity_at: NaiveDateTime,
}

impl TryFrom<&ReviewSession> for ReviewSessionRow {
    type Error = StoreError;

    fn try_from(session: &ReviewSession) -> Result<Self, Self::Error> {
        let position = i32::try_from(session.position)
            .map_err(|_| StoreError::Corrupt(format!("position {} out of range", session.position)))?;
        Ok(Self {
            owner_id: session.owner_id,
            card_queue: serde_json::to_string(&session.card_queue)?,
            position,
            state: session.state.as_str().to_string(),
            started_at: session.started_at,
            last_activity_at: session.last_activity_at,
        })
    }
}

impl TryFrom<ReviewSessionRow> for ReviewSession {
    type Error = StoreError;

    fn try_from(row: ReviewSessionRow) -> Result<Self, Self::Error> {
        let state = ReviewState::parse(&row.state)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown review state {}", row.state)))?;
        let position = usize::try_from(row.position)
            .map_err(|_| StoreError::Corrupt(format!("negative position {}", row.position)))?;
        Ok(Self {
            owner_id: row.owner_id,
            card_queue: serde_json::from_str(&row.card_queue)?,
            position,
            state,
            started_at: row.started_at,
            last_activity_at: row.last_activity_at,
        })
    }
}

/// Which side of the card the quiz shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardDirection {
    FrontToBack,
    BackToFront,
}

/// A single issued quiz question, addressed by its token
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    pub token: String,
    pub owner_id: i64,
    pub card_id: i32,
    pub direction: CardDirection,
    pub prompt: String,
    pub correct_answer: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revealed: bool,
}

impl QuizSession {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at
    }
}
