//! Sync coordinator for the eventide sync core.

mod coordinator;
mod error;
mod progress;

pub use coordinator::{Coordinator, ShutdownHandle};
pub use error::CoordinatorError;
pub use progress::{ProgressTag, SyncProgress};
