pub mod owner_lock;
pub mod render;
pub mod tasks;

pub use owner_lock::OwnerLocks;
pub use render::Templates;
pub use tasks::spawn_periodic;
