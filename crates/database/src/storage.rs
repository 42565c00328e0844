//! Async [`SyncStore`] facade over the blocking sled store.
//!
//! sled operations are synchronous; every trait method hops onto the
//! blocking pool so store calls stay suspension points for the sync tasks.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_common::{
    types::{
        filter::{ChildAddresses, Filter},
        interval::BlockInterval,
        records::{BlockRecord, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord},
    },
    CheckpointRow, EventBlockPage, EventBlockRequest, FilterIntervals, LogFactory, RpcCacheEntry,
    StoreError, SyncStore,
};

use crate::{
    error::{DbError, DbResult},
    sleddb::SyncDb,
};

/// Async store handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct Storage {
    db: Arc<SyncDb>,
}

impl Storage {
    pub(crate) fn new(db: Arc<SyncDb>) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&SyncDb) -> DbResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| DbError::TaskCancelled(e.to_string()))?;
        result.map_err(StoreError::from)
    }
}

#[async_trait]
impl SyncStore for Storage {
    async fn insert_intervals(
        &self,
        chain_id: u64,
        entries: Vec<(Filter, BlockInterval)>,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_intervals(chain_id, entries))
            .await
    }

    async fn get_intervals(&self, filters: Vec<Filter>) -> Result<Vec<FilterIntervals>, StoreError> {
        self.run(move |db| db.get_intervals(filters)).await
    }

    async fn insert_blocks(&self, blocks: Vec<BlockRecord>) -> Result<(), StoreError> {
        self.run(move |db| db.insert_blocks(blocks)).await
    }

    async fn get_block(
        &self,
        chain_id: u64,
        number: u64,
    ) -> Result<Option<BlockRecord>, StoreError> {
        self.run(move |db| db.get_block(chain_id, number)).await
    }

    async fn insert_logs(&self, logs: Vec<LogRecord>) -> Result<(), StoreError> {
        self.run(move |db| db.insert_logs(logs)).await
    }

    async fn insert_transactions(
        &self,
        transactions: Vec<TransactionRecord>,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_transactions(transactions))
            .await
    }

    async fn insert_transaction_receipts(
        &self,
        receipts: Vec<ReceiptRecord>,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_transaction_receipts(receipts))
            .await
    }

    async fn insert_traces(&self, traces: Vec<TraceRecord>) -> Result<(), StoreError> {
        self.run(move |db| db.insert_traces(traces)).await
    }

    async fn insert_factory_intervals(
        &self,
        factory: LogFactory,
        interval: BlockInterval,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_factory_intervals(&factory, interval))
            .await
    }

    async fn get_factory_intervals(
        &self,
        factory: LogFactory,
    ) -> Result<Vec<BlockInterval>, StoreError> {
        self.run(move |db| db.get_factory_intervals(&factory)).await
    }

    async fn insert_child_addresses(
        &self,
        factory: LogFactory,
        chain_id: u64,
        child_addresses: ChildAddresses,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_child_addresses(factory, chain_id, child_addresses))
            .await
    }

    async fn get_child_addresses(
        &self,
        factory: LogFactory,
    ) -> Result<ChildAddresses, StoreError> {
        self.run(move |db| db.get_child_addresses(&factory)).await
    }

    async fn get_event_block_data(
        &self,
        request: EventBlockRequest,
    ) -> Result<EventBlockPage, StoreError> {
        self.run(move |db| db.get_event_block_data(request)).await
    }

    async fn insert_rpc_request_results(
        &self,
        chain_id: u64,
        entries: Vec<RpcCacheEntry>,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.insert_rpc_request_results(chain_id, entries))
            .await
    }

    async fn get_rpc_request_results(
        &self,
        chain_id: u64,
        requests: Vec<String>,
    ) -> Result<Vec<Option<String>>, StoreError> {
        self.run(move |db| db.get_rpc_request_results(chain_id, requests))
            .await
    }

    async fn prune_rpc_request_results(
        &self,
        chain_id: u64,
        blocks: Vec<u64>,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.prune_rpc_request_results(chain_id, blocks))
            .await
    }

    async fn prune_blocks_above(
        &self,
        chain_id: u64,
        block_number: u64,
    ) -> Result<(), StoreError> {
        self.run(move |db| db.prune_blocks_above(chain_id, block_number))
            .await
    }

    async fn prune_by_chain(&self, chain_id: u64) -> Result<(), StoreError> {
        self.run(move |db| db.prune_by_chain(chain_id)).await
    }

    async fn get_safe_crash_recovery_block(
        &self,
        chain_id: u64,
        timestamp: u64,
    ) -> Result<Option<BlockRecord>, StoreError> {
        self.run(move |db| db.get_safe_crash_recovery_block(chain_id, timestamp))
            .await
    }

    async fn get_checkpoint_row(&self, chain_id: u64) -> Result<Option<CheckpointRow>, StoreError> {
        self.run(move |db| db.get_checkpoint_row(chain_id)).await
    }

    async fn upsert_checkpoint_row(&self, row: CheckpointRow) -> Result<(), StoreError> {
        self.run(move |db| db.upsert_checkpoint_row(row)).await
    }
}
