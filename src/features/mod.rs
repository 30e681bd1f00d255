pub mod importexport;
pub mod quiz;
pub mod reminders;
pub mod review;
pub mod settings;
pub mod srs;
