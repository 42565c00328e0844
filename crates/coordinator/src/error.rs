//! Coordinator errors.

use eventide_common::{EthClientError, IndexingError, StoreError};
use eventide_historical::HistoricalError;
use eventide_realtime::RealtimeError;
use thiserror::Error;

/// Errors of the sync coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// RPC client operation failed during setup.
    #[error("client error: {0}")]
    Client(#[from] EthClientError),

    /// The indexing runtime failed unrecoverably.
    #[error("indexing error: {0}")]
    Indexing(#[from] IndexingError),

    /// A historical syncer died.
    #[error("historical sync failed: {0}")]
    Historical(#[from] HistoricalError),

    /// A realtime syncer died.
    #[error("realtime sync failed: {0}")]
    Realtime(#[from] RealtimeError),

    /// A realtime syncer reported a fatal condition.
    #[error("chain {chain_id} fatal: {reason}")]
    ChainFatal { chain_id: u64, reason: String },

    /// A spawned sync task panicked.
    #[error("sync task panicked: {0}")]
    TaskPanicked(String),

    /// A chain referenced by a source has no configured client.
    #[error("no rpc client configured for chain {0}")]
    MissingClient(u64),
}
