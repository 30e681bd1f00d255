pub mod scheduler;

pub use scheduler::{apply_answer, due_set, Quality};
