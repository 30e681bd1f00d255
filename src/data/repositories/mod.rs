pub mod migrations;
pub mod sqlite;
pub mod store;

pub use sqlite::{DbPool, SqliteStore};
pub use store::CardStore;
