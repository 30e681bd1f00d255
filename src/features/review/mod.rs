pub mod manager;

pub use manager::{AnswerOutcome, ReviewManager};
