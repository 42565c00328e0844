//! Persistence interface of the sync core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    checkpoint::Checkpoint,
    events::BlockEventRows,
    filter::{ChildAddresses, Filter, LogFactory},
    fragment::Fragment,
    interval::BlockInterval,
    records::{BlockRecord, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord},
};

/// Ledger state of one fragment of a filter.
#[derive(Debug, Clone)]
pub struct FragmentIntervals {
    pub fragment: Fragment,
    /// Union of cached intervals across the fragment's adjacent ids.
    pub intervals: Vec<BlockInterval>,
}

/// Ledger state of a whole filter.
#[derive(Debug, Clone)]
pub struct FilterIntervals {
    pub filter: Filter,
    pub fragments: Vec<FragmentIntervals>,
    /// Intersection across all fragments: the ranges where the *entire*
    /// filter is cached.
    pub intervals: Vec<BlockInterval>,
}

/// One content-addressed RPC cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCacheEntry {
    /// Canonical JSON of the request.
    pub request: String,
    /// Block the response is tied to, when applicable (enables reorg
    /// pruning).
    pub block_number: Option<u64>,
    /// Raw JSON result.
    pub result: String,
}

/// Parameters of a paginated event-range scan.
#[derive(Debug, Clone)]
pub struct EventBlockRequest {
    pub chain_id: u64,
    /// `(source index, filter)` pairs to match rows against.
    pub filters: Vec<(usize, Filter)>,
    pub from_block: u64,
    pub to_block: u64,
    /// Per-table row limit of one page.
    pub limit: usize,
}

/// One page of an event-range scan.
#[derive(Debug, Default)]
pub struct EventBlockPage {
    /// Contiguous blocks in ascending order, each with its matched rows.
    pub blocks: Vec<(u64, BlockEventRows)>,
    /// Largest fully-returned block number; `None` when the page is empty.
    pub cursor: Option<u64>,
}

/// Per-chain crash-recovery checkpoint row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRow {
    pub chain_name: String,
    pub chain_id: u64,
    /// Last event emitted (monitoring).
    pub latest_checkpoint: Checkpoint,
    /// Last event durably indexed (crash-recovery point).
    pub safe_checkpoint: Checkpoint,
    /// Last event below the chain's finalized block.
    pub finalized_checkpoint: Checkpoint,
}

/// Content-addressed cache of blocks, logs, traces, transactions, receipts,
/// factory children, the interval ledger, and the RPC response cache.
///
/// All writes are idempotent per natural key.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait SyncStore: Send + Sync + 'static {
    /// Expands each filter into fragments and unions the interval into the
    /// ledger rows. Re-insertion is a no-op.
    async fn insert_intervals(
        &self,
        chain_id: u64,
        entries: Vec<(Filter, BlockInterval)>,
    ) -> Result<(), StoreError>;

    /// Reads the ledger for every fragment of every filter.
    async fn get_intervals(&self, filters: Vec<Filter>) -> Result<Vec<FilterIntervals>, StoreError>;

    /// Upserts block rows by `(chainId, number)`.
    async fn insert_blocks(&self, blocks: Vec<BlockRecord>) -> Result<(), StoreError>;

    /// Reads one block row.
    async fn get_block(
        &self,
        chain_id: u64,
        number: u64,
    ) -> Result<Option<BlockRecord>, StoreError>;

    /// Upserts log rows by `(chainId, blockNumber, logIndex)`.
    async fn insert_logs(&self, logs: Vec<LogRecord>) -> Result<(), StoreError>;

    /// Upserts transaction rows by `(chainId, blockNumber, transactionIndex)`.
    async fn insert_transactions(
        &self,
        transactions: Vec<TransactionRecord>,
    ) -> Result<(), StoreError>;

    /// Upserts receipt rows by `(chainId, blockNumber, transactionIndex)`.
    async fn insert_transaction_receipts(
        &self,
        receipts: Vec<ReceiptRecord>,
    ) -> Result<(), StoreError>;

    /// Upserts trace rows by
    /// `(chainId, blockNumber, transactionIndex, traceIndex)`.
    async fn insert_traces(&self, traces: Vec<TraceRecord>) -> Result<(), StoreError>;

    /// Unions a completed factory creation-scan range into the ledger,
    /// keyed by the factory id (separate from log fragments: a factory scan
    /// stores child addresses, not log rows).
    async fn insert_factory_intervals(
        &self,
        factory: LogFactory,
        interval: BlockInterval,
    ) -> Result<(), StoreError>;

    /// Cached creation-scan ranges of a factory.
    async fn get_factory_intervals(
        &self,
        factory: LogFactory,
    ) -> Result<Vec<BlockInterval>, StoreError>;

    /// Upserts factory children; on conflict the *minimum* first-seen block
    /// wins.
    async fn insert_child_addresses(
        &self,
        factory: LogFactory,
        chain_id: u64,
        child_addresses: ChildAddresses,
    ) -> Result<(), StoreError>;

    /// All known children of a factory with their first-seen blocks.
    async fn get_child_addresses(&self, factory: LogFactory)
        -> Result<ChildAddresses, StoreError>;

    /// Paginated forward-scan of cached event rows.
    async fn get_event_block_data(
        &self,
        request: EventBlockRequest,
    ) -> Result<EventBlockPage, StoreError>;

    /// Inserts RPC response cache entries keyed by the canonical request.
    async fn insert_rpc_request_results(
        &self,
        chain_id: u64,
        entries: Vec<RpcCacheEntry>,
    ) -> Result<(), StoreError>;

    /// Looks up cached RPC responses; position-aligned with `requests`.
    async fn get_rpc_request_results(
        &self,
        chain_id: u64,
        requests: Vec<String>,
    ) -> Result<Vec<Option<String>>, StoreError>;

    /// Deletes cached RPC responses tied to the given block numbers.
    async fn prune_rpc_request_results(
        &self,
        chain_id: u64,
        blocks: Vec<u64>,
    ) -> Result<(), StoreError>;

    /// Deletes every unfinalized row above `block_number` (reorg
    /// truncation): blocks, logs, transactions, receipts, traces, factory
    /// children first seen above the ancestor, and tied RPC cache entries.
    async fn prune_blocks_above(&self, chain_id: u64, block_number: u64)
        -> Result<(), StoreError>;

    /// Deletes everything recorded for a chain.
    async fn prune_by_chain(&self, chain_id: u64) -> Result<(), StoreError>;

    /// Greatest stored block with `timestamp < given`.
    async fn get_safe_crash_recovery_block(
        &self,
        chain_id: u64,
        timestamp: u64,
    ) -> Result<Option<BlockRecord>, StoreError>;

    /// Reads the per-chain checkpoint row.
    async fn get_checkpoint_row(&self, chain_id: u64) -> Result<Option<CheckpointRow>, StoreError>;

    /// Upserts the per-chain checkpoint row.
    async fn upsert_checkpoint_row(&self, row: CheckpointRow) -> Result<(), StoreError>;
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Failed to serialize a record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failed to deserialize a record.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Store invariant violated (corrupt key, missing companion row).
    #[error("store invariant violated: {0}")]
    InvariantViolated(String),

    /// Other unspecified error.
    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl StoreError {
    /// Creates a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a deserialization error.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Creates an invariant violation error.
    pub fn invariant_violated(msg: impl Into<String>) -> Self {
        Self::InvariantViolated(msg.into())
    }
}
