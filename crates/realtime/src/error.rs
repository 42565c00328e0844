//! Realtime syncer errors.

use eventide_common::{EthClientError, StoreError};
use thiserror::Error;

use crate::local_chain::LocalChainError;

/// Errors of the realtime sync task.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Store operation failed (recoverable; retried with backoff).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// RPC client operation failed (recoverable; retried with backoff).
    #[error("client error: {0}")]
    Client(#[from] EthClientError),

    /// Local-chain invariant violated while applying a block.
    #[error("local chain error: {0}")]
    Chain(#[from] LocalChainError),

    /// Reconciliation walked past the finalized block. FATAL: finalized
    /// application state cannot be invalidated; local state was restored
    /// before surfacing this.
    #[error("deep reorg beyond finalized block {finalized_number}")]
    DeepReorg { finalized_number: u64 },

    /// The event consumer hung up.
    #[error("event channel closed")]
    ChannelClosed,

    /// Consecutive head-fetch failures exceeded the wall-time budget.
    #[error("head polling failed for {elapsed_secs}s: {source}")]
    HeadPollingExhausted {
        elapsed_secs: u64,
        #[source]
        source: EthClientError,
    },

    /// Reconciliation retries exhausted.
    #[error("reconciliation retries exhausted: {0}")]
    RetriesExhausted(Box<RealtimeError>),

    /// Shutdown signal observed.
    #[error("shutdown")]
    Shutdown,
}

impl RealtimeError {
    /// Whether the task must stop (after restoring local state).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RealtimeError::DeepReorg { .. }
                | RealtimeError::ChannelClosed
                | RealtimeError::HeadPollingExhausted { .. }
                | RealtimeError::RetriesExhausted(_)
                | RealtimeError::Shutdown
        )
    }
}

pub(crate) type Result<T> = std::result::Result<T, RealtimeError>;
