//! Builder and handle of the per-chain historical syncer.

use std::{collections::HashMap, future::Future, sync::Arc};

use eventide_common::{BackfillProgress, EthClient, StoreError, SyncStore};
use eventide_config::{defaults::DEFAULT_CHILD_ADDRESS_BATCH_SIZE, ChainParams, Source};
use tokio::sync::watch;

use crate::{
    ctx::HistoricalCtx,
    error::HistoricalError,
    queue::TaskQueue,
    state::{HistoricalState, PlannedSource},
    task::historical_sync_task,
};

/// Handle for observing a chain's backfill.
#[derive(Debug, Clone)]
pub struct HistoricalHandle {
    progress_rx: watch::Receiver<BackfillProgress>,
    sealed_rx: watch::Receiver<Option<u64>>,
}

impl HistoricalHandle {
    /// Watcher of backfill counters.
    pub fn progress_watcher(&self) -> watch::Receiver<BackfillProgress> {
        self.progress_rx.clone()
    }

    /// Watcher of the sealed block cursor: events up to it are durable and
    /// emittable.
    pub fn sealed_watcher(&self) -> watch::Receiver<Option<u64>> {
        self.sealed_rx.clone()
    }
}

/// Builder for a chain's historical syncer.
#[derive(Debug)]
pub struct HistoricalSyncBuilder<TClient, TStore> {
    chain: Arc<ChainParams>,
    client: Arc<TClient>,
    store: Arc<TStore>,
    sources: Vec<(usize, Source)>,
    finalized_block: u64,
    default_max_block_range: u64,
    shutdown_rx: watch::Receiver<bool>,
    child_batch_size: usize,
    max_concurrency: Option<usize>,
}

impl<TClient, TStore> HistoricalSyncBuilder<TClient, TStore>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    /// Creates a builder with all required fields.
    pub fn new(
        chain: Arc<ChainParams>,
        client: Arc<TClient>,
        store: Arc<TStore>,
        sources: Vec<(usize, Source)>,
        finalized_block: u64,
        default_max_block_range: u64,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain,
            client,
            store,
            sources,
            finalized_block,
            default_max_block_range,
            shutdown_rx,
            child_batch_size: DEFAULT_CHILD_ADDRESS_BATCH_SIZE,
            max_concurrency: None,
        }
    }

    /// Overrides the child-address batch size.
    pub fn with_child_batch_size(mut self, value: usize) -> Self {
        self.child_batch_size = value;
        self
    }

    /// Overrides the worker-pool width.
    pub fn with_max_concurrency(mut self, value: usize) -> Self {
        self.max_concurrency = Some(value);
        self
    }

    /// Reads the interval ledger, plans the backfill, and returns the
    /// handle plus the task to drive.
    pub async fn build(
        self,
    ) -> Result<
        (
            HistoricalHandle,
            impl Future<Output = Result<(), HistoricalError>>,
        ),
        StoreError,
    > {
        let planned: Vec<PlannedSource> = self
            .sources
            .iter()
            .map(|(source_index, source)| PlannedSource {
                source_index: *source_index,
                name: source.name().to_owned(),
                filter: source.filter().clone(),
                max_block_range: source.max_block_range(self.default_max_block_range),
            })
            .collect();

        let ledger_rows = self
            .store
            .get_intervals(planned.iter().map(|p| p.filter.clone()).collect())
            .await?;
        let mut ledger = HashMap::new();
        for (planned_source, intervals) in planned.iter().zip(ledger_rows) {
            ledger.insert(planned_source.source_index, intervals);
        }

        let mut factory_ledger = HashMap::new();
        for planned_source in &planned {
            for factory in planned_source.filter.factories() {
                let id = factory.id();
                if factory_ledger.contains_key(&id) {
                    continue;
                }
                let intervals = self.store.get_factory_intervals(factory.clone()).await?;
                factory_ledger.insert(id, intervals);
            }
        }

        let (state, tasks) = HistoricalState::plan(
            self.chain.id(),
            self.finalized_block,
            planned,
            &ledger,
            &factory_ledger,
        );
        let mut queue = TaskQueue::default();
        for task in tasks {
            queue.push(task);
        }

        let (progress_tx, progress_rx) = watch::channel(state.progress());
        let (sealed_tx, sealed_rx) = watch::channel(state.emit_cursor());
        let handle = HistoricalHandle {
            progress_rx,
            sealed_rx,
        };

        let max_concurrency = self
            .max_concurrency
            .unwrap_or_else(|| (self.chain.max_requests_per_second() as usize).max(1));
        let ctx = HistoricalCtx {
            client: self.client,
            store: self.store,
            chain: self.chain,
            progress_tx,
            sealed_tx,
            shutdown_rx: self.shutdown_rx,
            child_batch_size: self.child_batch_size,
            max_concurrency,
        };
        let task = historical_sync_task(state, queue, ctx);

        Ok((handle, task))
    }
}
