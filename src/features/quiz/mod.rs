pub mod manager;

pub use manager::QuizManager;
