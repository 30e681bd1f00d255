use chrono::NaiveDateTime;

use crate::data::models::{
    Card, ReviewSession, ReviewState, StoreError, UserPreferences, WordPair,
};

/// Repository interface over cards, preferences and persisted review
/// sessions. Session managers and the reminder dispatcher only talk to
/// storage through this trait.
///
/// Methods returning `bool` report the outcome of a compare-and-set:
/// `false` means another request changed the row first and nothing was
/// written.
pub trait CardStore: Send + Sync {
    /// Inserts new pairs and updates the back side of existing fronts.
    /// Returns `(inserted, updated)`.
    fn upsert_pairs(
        &self,
        owner_id: i64,
        pairs: &[WordPair],
        now: NaiveDateTime,
    ) -> Result<(usize, usize), StoreError>;

    fn card(&self, owner_id: i64, card_id: i32) -> Result<Option<Card>, StoreError>;

    /// All cards of an owner in insertion order.
    fn cards(&self, owner_id: i64) -> Result<Vec<Card>, StoreError>;

    fn count_cards(&self, owner_id: i64) -> Result<i64, StoreError>;

    /// Cards with `due_at <= now`, earliest first, ties by ascending id.
    fn due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Card>, StoreError>;

    /// Cards with `due_at > now` in random order.
    fn random_not_due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Card>, StoreError>;

    fn count_due_cards(&self, owner_id: i64, now: NaiveDateTime) -> Result<i64, StoreError>;

    /// Moves every card due at `now` to `until`. Returns how many moved.
    fn postpone_due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<usize, StoreError>;

    fn random_card(&self, owner_id: i64) -> Result<Option<Card>, StoreError>;

    /// Writes the review state of a card.
    fn update_card(&self, card: &Card) -> Result<(), StoreError>;

    /// Deletes every card and the review session of an owner. Returns the
    /// number of deleted cards.
    fn clear_owner(&self, owner_id: i64) -> Result<usize, StoreError>;

    fn preferences(&self, owner_id: i64) -> Result<Option<UserPreferences>, StoreError>;

    fn save_preferences(&self, prefs: &UserPreferences) -> Result<(), StoreError>;

    /// Preferences whose `next_reminder_at <= now`, paused ones excluded.
    fn preferences_due(&self, now: NaiveDateTime) -> Result<Vec<UserPreferences>, StoreError>;

    /// Notes that the owner used the bot: clears the missed count and
    /// lifts a pause. Returns whether reminders were paused.
    fn record_activity(&self, owner_id: i64, now: NaiveDateTime) -> Result<bool, StoreError>;

    fn review_session(&self, owner_id: i64) -> Result<Option<ReviewSession>, StoreError>;

    /// Creates the session row; `false` when the owner already has one.
    fn insert_review_session(&self, session: &ReviewSession) -> Result<bool, StoreError>;

    /// Overwrites position, state and activity time if the stored row is
    /// still in `expected_state` at `expected_position`.
    fn update_review_session(
        &self,
        session: &ReviewSession,
        expected_state: ReviewState,
        expected_position: usize,
    ) -> Result<bool, StoreError>;

    /// Atomically stores the graded card and advances the session, or
    /// deletes it when `next` is `None`. Guarded by the session being in
    /// `AwaitingAnswer` at `expected_position`.
    fn commit_answer(
        &self,
        card: &Card,
        expected_position: usize,
        next: Option<&ReviewSession>,
    ) -> Result<bool, StoreError>;

    fn delete_review_session(&self, owner_id: i64) -> Result<bool, StoreError>;

    /// Removes sessions with no activity since `before`.
    fn delete_idle_review_sessions(&self, before: NaiveDateTime) -> Result<usize, StoreError>;
}
