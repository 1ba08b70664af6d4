pub mod error;
pub mod manager;

pub use error::SyncError;
pub use manager::{Snapshot, SyncManager};
