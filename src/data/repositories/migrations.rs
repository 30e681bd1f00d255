use diesel::connection::SimpleConnection;
use diesel::SqliteConnection;

use crate::data::models::StoreError;
use crate::data::repositories::DbPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cards (
    card_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    owner_id BIGINT NOT NULL,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    ease_factor DOUBLE NOT NULL DEFAULT 2.5,
    interval_days INTEGER NOT NULL DEFAULT 0,
    repetitions INTEGER NOT NULL DEFAULT 0,
    due_at TIMESTAMP NOT NULL,
    last_reviewed_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL,
    UNIQUE (owner_id, front)
);

CREATE INDEX IF NOT EXISTS idx_cards_owner_due ON cards (owner_id, due_at);

CREATE TABLE IF NOT EXISTS user_preferences (
    owner_id BIGINT PRIMARY KEY NOT NULL,
    reminders_per_day INTEGER NOT NULL DEFAULT 1,
    cards_per_session INTEGER NOT NULL DEFAULT 5,
    last_reminder_at TIMESTAMP,
    next_reminder_at TIMESTAMP NOT NULL,
    missed_reminders INTEGER NOT NULL DEFAULT 0,
    reminders_paused BOOLEAN NOT NULL DEFAULT 0,
    last_active_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_preferences_next ON user_preferences (next_reminder_at);

CREATE TABLE IF NOT EXISTS review_sessions (
    owner_id BIGINT PRIMARY KEY NOT NULL,
    card_queue TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL,
    started_at TIMESTAMP NOT NULL,
    last_activity_at TIMESTAMP NOT NULL
);
"#;

/// Creates missing tables. Safe to run on every start.
pub fn run(pool: &DbPool) -> Result<(), StoreError> {
    let mut conn = pool.get()?;
    apply(&mut conn)
}

fn apply(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    conn.batch_execute(SCHEMA)?;
    log::debug!("Database schema is up to date");
    Ok(())
}
