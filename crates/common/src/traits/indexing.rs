//! Boundary to the user-defined indexing runtime.
//!
//! The runtime is a black box; the only cross-boundary contract is the
//! [`Event`](crate::types::events::Event) shape and the error taxonomy
//! below.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{checkpoint::Checkpoint, events::Event};

/// The user-defined indexing runtime.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait IndexingRuntime: Send + Sync + 'static {
    /// Runs once per source before any event, when starting without a crash
    /// recovery checkpoint.
    async fn process_setup_events(&self) -> Result<(), IndexingError>;

    /// Processes one historical batch inside a single transaction.
    async fn process_historical_events(&self, events: Vec<Event>) -> Result<(), IndexingError>;

    /// Processes the events of one realtime block in its own transaction.
    async fn process_realtime_events(&self, events: Vec<Event>) -> Result<(), IndexingError>;

    /// Reverts indexed state above the checkpoint (reorg recovery).
    async fn revert(&self, checkpoint: Checkpoint) -> Result<(), IndexingError>;

    /// Permanently erases the per-row reorg journal up to the finalized
    /// checkpoint.
    async fn finalize(&self, checkpoint: Checkpoint) -> Result<(), IndexingError>;
}

/// Errors surfaced by the indexing runtime.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// A handler read a field that was not in the fetched set; the
    /// coordinator re-fetches the batch with the field included and
    /// retries.
    #[error("invalid event access: {field}")]
    InvalidEventAccess {
        /// The missing field.
        field: String,
    },

    /// User code failed in a way that retrying cannot fix.
    #[error("non-retryable user error: {0}")]
    NonRetryableUserError(String),

    /// Other unspecified error (treated as retryable once).
    #[error(transparent)]
    Other(#[from] eyre::Error),
}
