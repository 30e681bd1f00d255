use diesel::result::Error as DieselError;
use thiserror::Error;

/// Reply for any quiz token that cannot be revealed, whatever the reason.
pub const QUIZ_UNAVAILABLE: &str = "This quiz is no longer available. Send /game for a new one.";

// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DieselError),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

// Message delivery failures
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Rejected by chat API: {0}")]
    Rejected(String),
}

/// Errors surfaced by the session managers, the dispatcher and the command
/// handlers. Every variant maps to a chat reply through [`CoreError::user_message`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No cards available")]
    NoCards,
    #[error("Forbidden")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl CoreError {
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(msg) | CoreError::Conflict(msg) | CoreError::NotFound(msg) => {
                msg.clone()
            }
            CoreError::NoCards => {
                "You have no word pairs yet. Send a few lines like: word,translation"
                    .to_string()
            }
            CoreError::Forbidden => QUIZ_UNAVAILABLE.to_string(),
            CoreError::Store(_) => "Something went wrong on our side. Please try again later.".to_string(),
            CoreError::Delivery(_) => "Failed to deliver the message. Please try again later.".to_string(),
        }
    }

    /// Whether the failure comes from a collaborator rather than the request.
    pub fn is_boundary(&self) -> bool {
        matches!(self, CoreError::Store(_) | CoreError::Delivery(_))
    }
}

impl From<DieselError> for CoreError {
    fn from(err: DieselError) -> Self {
        CoreError::Store(StoreError::Database(err))
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .collect::<Vec<_>>()
            .join("; ");
        if message.is_empty() {
            CoreError::Validation(err.to_string())
        } else {
            CoreError::Validation(message)
        }
    }
}

// Startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
