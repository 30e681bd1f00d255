pub mod card_models;
pub mod errors;
pub mod preference_models;
pub mod session_models;

pub use card_models::{Card, NewCard, WordPair, EASE_FLOOR};
pub use errors::{ConfigError, CoreError, DeliveryError, StoreError, QUIZ_UNAVAILABLE};
pub use preference_models::{UserPreferences, PAUSE_AFTER_MISSES};
pub use session_models::{
    CardDirection, QuizSession, ReviewSession, ReviewSessionRow, ReviewState,
};
