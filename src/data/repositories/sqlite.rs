use chrono::NaiveDateTime;
use diesel::connection::SimpleConnection;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;

use crate::data::models::{
    Card, NewCard, ReviewSession, ReviewSessionRow, ReviewState, StoreError, UserPreferences,
    WordPair,
};
use crate::data::repositories::CardStore;
use crate::schema::{cards, review_sessions, user_preferences};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas so concurrent writers wait instead of failing
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn build_pool(database_url: &str) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    Ok(pool)
}

/// SQLite-backed card store
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Single-connection in-memory database with the schema applied.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .expect("in-memory pool");
        crate::data::repositories::migrations::run(&pool).expect("schema");
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn, StoreError> {
        Ok(self.pool.get()?)
    }
}

fn write_card_state(conn: &mut SqliteConnection, card: &Card) -> QueryResult<usize> {
    diesel::update(cards::table.find(card.card_id))
        .set((
            cards::ease_factor.eq(card.ease_factor),
            cards::interval_days.eq(card.interval_days),
            cards::repetitions.eq(card.repetitions),
            cards::due_at.eq(card.due_at),
            cards::last_reviewed_at.eq(card.last_reviewed_at),
        ))
        .execute(conn)
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl CardStore for SqliteStore {
    fn upsert_pairs(
        &self,
        owner_id: i64,
        pairs: &[WordPair],
        now: NaiveDateTime,
    ) -> Result<(usize, usize), StoreError> {
        if pairs.is_empty() {
            return Ok((0, 0));
        }
        let mut conn = self.conn()?;
        let counts = conn.transaction::<_, DieselError, _>(|conn| {
            let mut inserted = 0;
            let mut updated = 0;
            for pair in pairs {
                let existing = cards::table
                    .filter(cards::owner_id.eq(owner_id))
                    .filter(cards::front.eq(&pair.front))
                    .select((cards::card_id, cards::back))
                    .first::<(i32, String)>(conn)
                    .optional()?;

                match existing {
                    Some((_, back)) if back == pair.back => {}
                    Some((card_id, _)) => {
                        diesel::update(cards::table.find(card_id))
                            .set(cards::back.eq(&pair.back))
                            .execute(conn)?;
                        updated += 1;
                    }
                    None => {
                        diesel::insert_into(cards::table)
                            .values(&NewCard::fresh(owner_id, &pair.front, &pair.back, now))
                            .execute(conn)?;
                        inserted += 1;
                    }
                }
            }
            Ok((inserted, updated))
        })?;
        Ok(counts)
    }

    fn card(&self, owner_id: i64, card_id: i32) -> Result<Option<Card>, StoreError> {
        let mut conn = self.conn()?;
        let card = cards::table
            .filter(cards::card_id.eq(card_id))
            .filter(cards::owner_id.eq(owner_id))
            .select(Card::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(card)
    }

    fn cards(&self, owner_id: i64) -> Result<Vec<Card>, StoreError> {
        let mut conn = self.conn()?;
        let cards = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .order(cards::card_id.asc())
            .select(Card::as_select())
            .load(&mut conn)?;
        Ok(cards)
    }

    fn count_cards(&self, owner_id: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Card>, StoreError> {
        let mut conn = self.conn()?;
        let due = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .filter(cards::due_at.le(now))
            .order((cards::due_at.asc(), cards::card_id.asc()))
            .limit(to_limit(limit))
            .select(Card::as_select())
            .load(&mut conn)?;
        Ok(due)
    }

    fn random_not_due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Card>, StoreError> {
        let mut conn = self.conn()?;
        let cards = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .filter(cards::due_at.gt(now))
            .order(sql::<BigInt>("RANDOM()"))
            .limit(to_limit(limit))
            .select(Card::as_select())
            .load(&mut conn)?;
        Ok(cards)
    }

    fn count_due_cards(&self, owner_id: i64, now: NaiveDateTime) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .filter(cards::due_at.le(now))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn postpone_due_cards(
        &self,
        owner_id: i64,
        now: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let moved = diesel::update(
            cards::table
                .filter(cards::owner_id.eq(owner_id))
                .filter(cards::due_at.le(now)),
        )
        .set(cards::due_at.eq(until))
        .execute(&mut conn)?;
        Ok(moved)
    }

    fn random_card(&self, owner_id: i64) -> Result<Option<Card>, StoreError> {
        let mut conn = self.conn()?;
        let card = cards::table
            .filter(cards::owner_id.eq(owner_id))
            .order(sql::<BigInt>("RANDOM()"))
            .select(Card::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(card)
    }

    fn update_card(&self, card: &Card) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        write_card_state(&mut conn, card)?;
        Ok(())
    }

    fn clear_owner(&self, owner_id: i64) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let deleted = conn.transaction::<_, DieselError, _>(|conn| {
            let deleted =
                diesel::delete(cards::table.filter(cards::owner_id.eq(owner_id))).execute(conn)?;
            diesel::delete(review_sessions::table.filter(review_sessions::owner_id.eq(owner_id)))
                .execute(conn)?;
            Ok(deleted)
        })?;
        Ok(deleted)
    }

    fn preferences(&self, owner_id: i64) -> Result<Option<UserPreferences>, StoreError> {
        let mut conn = self.conn()?;
        let prefs = user_preferences::table
            .find(owner_id)
            .select(UserPreferences::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(prefs)
    }

    fn save_preferences(&self, prefs: &UserPreferences) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::replace_into(user_preferences::table)
            .values(prefs)
            .execute(&mut conn)?;
        Ok(())
    }

    fn preferences_due(&self, now: NaiveDateTime) -> Result<Vec<UserPreferences>, StoreError> {
        let mut conn = self.conn()?;
        let due = user_preferences::table
            .filter(user_preferences::next_reminder_at.le(now))
            .filter(user_preferences::reminders_paused.eq(false))
            .order(user_preferences::owner_id.asc())
            .select(UserPreferences::as_select())
            .load(&mut conn)?;
        Ok(due)
    }

    fn record_activity(&self, owner_id: i64, now: NaiveDateTime) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let was_paused = conn.transaction::<_, DieselError, _>(|conn| {
            let paused = user_preferences::table
                .find(owner_id)
                .select(user_preferences::reminders_paused)
                .first::<bool>(conn)
                .optional()?;
            if paused.is_some() {
                diesel::update(user_preferences::table.find(owner_id))
                    .set((
                        user_preferences::last_active_at.eq(Some(now)),
                        user_preferences::missed_reminders.eq(0),
                        user_preferences::reminders_paused.eq(false),
                    ))
                    .execute(conn)?;
            }
            Ok(paused.unwrap_or(false))
        })?;
        Ok(was_paused)
    }

    fn review_session(&self, owner_id: i64) -> Result<Option<ReviewSession>, StoreError> {
        let mut conn = self.conn()?;
        let row = review_sessions::table
            .find(owner_id)
            .select(ReviewSessionRow::as_select())
            .first(&mut conn)
            .optional()?;
        row.map(ReviewSession::try_from).transpose()
    }

    fn insert_review_session(&self, session: &ReviewSession) -> Result<bool, StoreError> {
        let row = ReviewSessionRow::try_from(session)?;
        let mut conn = self.conn()?;
        match diesel::insert_into(review_sessions::table)
            .values(&row)
            .execute(&mut conn)
        {
            Ok(_) => Ok(true),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn update_review_session(
        &self,
        session: &ReviewSession,
        expected_state: ReviewState,
        expected_position: usize,
    ) -> Result<bool, StoreError> {
        let row = ReviewSessionRow::try_from(session)?;
        let expected_position = i32::try_from(expected_position)
            .map_err(|_| StoreError::Corrupt("position out of range".into()))?;
        let mut conn = self.conn()?;
        let affected = diesel::update(
            review_sessions::table
                .filter(review_sessions::owner_id.eq(row.owner_id))
                .filter(review_sessions::state.eq(expected_state.as_str()))
                .filter(review_sessions::position.eq(expected_position)),
        )
        .set((
            review_sessions::position.eq(row.position),
            review_sessions::state.eq(&row.state),
            review_sessions::last_activity_at.eq(row.last_activity_at),
        ))
        .execute(&mut conn)?;
        Ok(affected == 1)
    }

    fn commit_answer(
        &self,
        card: &Card,
        expected_position: usize,
        next: Option<&ReviewSession>,
    ) -> Result<bool, StoreError> {
        let next_row = next.map(ReviewSessionRow::try_from).transpose()?;
        let expected_position = i32::try_from(expected_position)
            .map_err(|_| StoreError::Corrupt("position out of range".into()))?;
        let mut conn = self.conn()?;

        let result = conn.transaction::<_, DieselError, _>(|conn| {
            write_card_state(conn, card)?;

            let target = review_sessions::table
                .filter(review_sessions::owner_id.eq(card.owner_id))
                .filter(review_sessions::state.eq(ReviewState::AwaitingAnswer.as_str()))
                .filter(review_sessions::position.eq(expected_position));

            let affected = match &next_row {
                Some(row) => diesel::update(target)
                    .set((
                        review_sessions::position.eq(row.position),
                        review_sessions::state.eq(&row.state),
                        review_sessions::last_activity_at.eq(row.last_activity_at),
                    ))
                    .execute(conn)?,
                None => diesel::delete(target).execute(conn)?,
            };

            // Lost the race: undo the card write as well.
            if affected == 0 {
                return Err(DieselError::RollbackTransaction);
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(DieselError::RollbackTransaction) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_review_session(&self, owner_id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(review_sessions::table.find(owner_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn delete_idle_review_sessions(&self, before: NaiveDateTime) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            review_sessions::table.filter(review_sessions::last_activity_at.lt(before)),
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }
}
