pub mod coordinator;
mod worker;

pub use coordinator::RefreshCoordinator;
pub use worker::MAX_BATCH_SIZE;
