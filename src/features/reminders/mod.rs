pub mod dispatcher;
pub mod overdue;

pub use dispatcher::ReminderDispatcher;
