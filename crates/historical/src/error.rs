//! Historical syncer errors.

use eventide_common::{EthClientError, StoreError};
use thiserror::Error;

/// Errors of the historical sync task.
#[derive(Debug, Error)]
pub enum HistoricalError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// RPC client operation failed beyond recovery.
    #[error("client error: {0}")]
    Client(#[from] EthClientError),

    /// A task exhausted its retry budget.
    #[error("task retries exhausted for blocks [{from_block}, {to_block}]: {source}")]
    RetriesExhausted {
        from_block: u64,
        to_block: u64,
        #[source]
        source: EthClientError,
    },

    /// Shutdown signal observed.
    #[error("shutdown")]
    Shutdown,
}

impl HistoricalError {
    /// Whether the task should terminate without logging an error.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, HistoricalError::Shutdown)
    }
}

pub(crate) type Result<T> = std::result::Result<T, HistoricalError>;
