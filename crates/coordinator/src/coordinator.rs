//! Sync lifecycle orchestration.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use eventide_assembler::{AssemblerEvent, ChainFeed, StreamAssembler};
use eventide_common::{
    block_by_number_checked,
    types::filter::Filter,
    Checkpoint, CheckpointRow, EthClient, Event, HistoricalBatch, IndexingError,
    IndexingRuntime, LightBlock, RealtimeEvent, SyncStore,
};
use eventide_config::{defaults::DEFAULT_EVENT_PAGE_LIMIT, SyncConfig};
use eventide_database::CachedEthClient;
use eventide_historical::HistoricalSyncBuilder;
use eventide_realtime::{RealtimeError, RealtimeSyncBuilder};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::CoordinatorError,
    progress::{ProgressTag, SyncProgress},
};

/// Signals shutdown to every sync task when triggered or dropped.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owns per-chain progress and drives the whole sync pipeline.
#[derive(Debug)]
pub struct Coordinator<TClient, TStore, TRuntime> {
    config: SyncConfig,
    clients: HashMap<u64, Arc<TClient>>,
    store: Arc<TStore>,
    runtime: Arc<TRuntime>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<TClient, TStore, TRuntime> Coordinator<TClient, TStore, TRuntime>
where
    TClient: EthClient,
    TStore: SyncStore,
    TRuntime: IndexingRuntime,
{
    /// Creates the coordinator and its shutdown handle.
    ///
    /// Dropping the handle also signals shutdown.
    pub fn new(
        config: SyncConfig,
        clients: HashMap<u64, Arc<TClient>>,
        store: Arc<TStore>,
        runtime: Arc<TRuntime>,
    ) -> (Self, ShutdownHandle) {
        let (tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                config,
                clients,
                store,
                runtime,
                shutdown_rx,
            },
            ShutdownHandle { tx },
        )
    }

    /// Runs setup, historical backfill, and the realtime loop until
    /// shutdown or a fatal error.
    pub async fn run(self) -> Result<(), CoordinatorError> {
        let mut progress: HashMap<u64, SyncProgress> = HashMap::new();
        let mut feeds: Vec<ChainFeed<TStore>> = Vec::new();
        let mut tasks: Vec<JoinHandle<Result<(), CoordinatorError>>> = Vec::new();
        let mut chains_needing_setup: Vec<u64> = Vec::new();

        for chain in self.config.chains() {
            let chain_id = chain.id();
            let sources = self.config.sources_for_chain(chain_id);
            if sources.is_empty() {
                continue;
            }
            let raw_client = self
                .clients
                .get(&chain_id)
                .ok_or(CoordinatorError::MissingClient(chain_id))?
                .clone();
            let client = Arc::new(CachedEthClient::new(
                raw_client,
                self.store.clone(),
                chain_id,
                chain.cache_disabled(),
            ));

            let latest_number = client.block_number().await?;
            let finalized_number = latest_number.saturating_sub(chain.finality_block_count());
            let finalized_block =
                block_by_number_checked(&*client, finalized_number, false).await?;

            let chain_progress = self
                .build_progress(chain_id, &sources, &finalized_block, latest_number)
                .await?;
            info!(
                chain = %chain.name(),
                start = chain_progress.start,
                end = ?chain_progress.end,
                finalized = finalized_number,
                "chain progress initialized"
            );

            let checkpoint_row = self.store.get_checkpoint_row(chain_id).await?;
            let resume_after = checkpoint_row.as_ref().map(|row| row.safe_checkpoint);
            if checkpoint_row.is_none() {
                chains_needing_setup.push(chain_id);
            }

            let owned_sources: Vec<(usize, eventide_config::Source)> = sources
                .iter()
                .map(|(index, source)| (*index, (*source).clone()))
                .collect();
            let filters: Vec<(usize, Filter)> = owned_sources
                .iter()
                .map(|(index, source)| (*index, source.filter().clone()))
                .collect();

            let (historical_handle, historical_task) = HistoricalSyncBuilder::new(
                chain.clone(),
                client.clone(),
                self.store.clone(),
                owned_sources.clone(),
                finalized_number,
                self.config.max_block_range(),
                self.shutdown_rx.clone(),
            )
            .build()
            .await?;
            tasks.push(tokio::spawn(async move {
                match historical_task.await {
                    Err(error) if !error.is_shutdown() => {
                        Err(CoordinatorError::Historical(error))
                    }
                    _ => Ok(()),
                }
            }));

            let (realtime_handle, realtime_task) = RealtimeSyncBuilder::new(
                chain.clone(),
                client,
                self.store.clone(),
                owned_sources,
                LightBlock::from(&finalized_block),
                self.shutdown_rx.clone(),
            )
            .build()
            .await?;
            tasks.push(tokio::spawn(async move {
                match realtime_task.await {
                    // fatals already travel the event stream; shutdown is
                    // swallowed here
                    Err(RealtimeError::Shutdown) | Ok(()) => Ok(()),
                    Err(error) if error.is_fatal() => Ok(()),
                    Err(error) => Err(CoordinatorError::Realtime(error)),
                }
            }));

            feeds.push(ChainFeed {
                chain_id,
                sources: filters,
                store: self.store.clone(),
                sealed_rx: historical_handle.sealed_watcher(),
                end_block: finalized_number,
                resume_after,
                realtime_rx: realtime_handle.into_events(),
            });
            progress.insert(chain_id, chain_progress);
        }

        if !chains_needing_setup.is_empty() {
            info!(chains = ?chains_needing_setup, "running setup events");
            self.runtime.process_setup_events().await?;
            for chain_id in chains_needing_setup {
                let chain_progress = &progress[&chain_id];
                let start = chain_progress.checkpoint(ProgressTag::Start);
                self.upsert_row(chain_id, start, start, start).await?;
            }
        }

        let mut assembler = StreamAssembler::new(
            self.config.ordering(),
            self.config.events_per_chunk(),
            DEFAULT_EVENT_PAGE_LIMIT,
            feeds,
        );
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            for task in &mut tasks {
                if task.is_finished() {
                    match task.await {
                        Ok(result) => result?,
                        Err(join_error) => {
                            return Err(CoordinatorError::TaskPanicked(join_error.to_string()))
                        }
                    }
                }
            }
            tasks.retain(|task| !task.is_finished());

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("shutdown requested; stopping sync");
                        return Ok(());
                    }
                }
                event = assembler.next_event() => match event? {
                    None => {
                        info!("event stream ended");
                        return Ok(());
                    }
                    Some(AssemblerEvent::Historical(batch)) => {
                        self.dispatch_historical(batch, &mut progress).await?;
                    }
                    Some(AssemblerEvent::HistoricalComplete) => {
                        info!("historical sync complete on all chains; realtime from here");
                    }
                    Some(AssemblerEvent::Realtime(event)) => {
                        self.dispatch_realtime(event, &mut progress).await?;
                    }
                },
            }
        }
    }

    async fn build_progress(
        &self,
        chain_id: u64,
        sources: &[(usize, &eventide_config::Source)],
        finalized_block: &eventide_common::types::rpc::Block,
        latest_number: u64,
    ) -> Result<SyncProgress, CoordinatorError> {
        let start = sources
            .iter()
            .map(|(_, s)| s.filter().from_block())
            .min()
            .unwrap_or(0);
        let end = sources
            .iter()
            .map(|(_, s)| s.filter().to_block())
            .collect::<Option<Vec<u64>>>()
            .map(|ends| ends.into_iter().max().unwrap_or(0));

        // a cached start block supplies the real timestamp; otherwise fall
        // back to the wall clock
        let start_timestamp = match self.store.get_block(chain_id, start).await? {
            Some(block) => block.timestamp,
            None => wall_clock(),
        };
        let end_timestamp = match end {
            Some(end) => self.store.get_block(chain_id, end).await?.map(|b| b.timestamp),
            None => None,
        };

        Ok(SyncProgress {
            chain_id,
            start,
            start_timestamp,
            end,
            end_timestamp,
            current: start.saturating_sub(1),
            current_timestamp: start_timestamp,
            finalized: finalized_block.number,
            finalized_timestamp: finalized_block.timestamp,
            latest: latest_number,
            latest_timestamp: finalized_block.timestamp,
        })
    }

    async fn dispatch_historical(
        &self,
        batch: HistoricalBatch,
        progress: &mut HashMap<u64, SyncProgress>,
    ) -> Result<(), CoordinatorError> {
        debug!(
            chain_id = batch.chain_id,
            events = batch.events.len(),
            checkpoint = %batch.checkpoint,
            "dispatching historical batch"
        );
        self.index_events(batch.events, Phase::Historical).await?;

        if let Some(chain_progress) = progress.get_mut(&batch.chain_id) {
            chain_progress
                .advance_current(batch.checkpoint.block_number, batch.checkpoint.block_timestamp);
            let finalized = chain_progress.checkpoint(ProgressTag::Finalized);
            self.upsert_row(batch.chain_id, batch.checkpoint, batch.checkpoint, finalized)
                .await?;
        }
        Ok(())
    }

    async fn dispatch_realtime(
        &self,
        event: RealtimeEvent,
        progress: &mut HashMap<u64, SyncProgress>,
    ) -> Result<(), CoordinatorError> {
        match event {
            RealtimeEvent::Block { data, ack } => {
                let chain_id = data.chain_id;
                let block_end = Checkpoint::block_end(
                    data.block.timestamp,
                    chain_id,
                    data.block.number,
                );

                match self.index_events(data.events, Phase::Realtime).await {
                    Ok(()) => {}
                    Err(error) => {
                        let _ = ack.send(false);
                        return Err(error);
                    }
                }
                let _ = ack.send(true);

                if let Some(chain_progress) = progress.get_mut(&chain_id) {
                    chain_progress.advance_current(data.block.number, data.block.timestamp);
                    chain_progress.observe_latest(data.block.number, data.block.timestamp);
                    let finalized = chain_progress.checkpoint(ProgressTag::Finalized);
                    self.upsert_row(chain_id, block_end, block_end, finalized).await?;
                }
            }
            RealtimeEvent::Reorg {
                chain_id,
                common_ancestor,
                reorged_blocks,
            } => {
                warn!(
                    chain_id,
                    ancestor = common_ancestor.number,
                    depth = reorged_blocks.len(),
                    "reorg; reverting indexed state"
                );
                let ancestor_end = Checkpoint::block_end(
                    common_ancestor.timestamp,
                    chain_id,
                    common_ancestor.number,
                );
                self.runtime.revert(ancestor_end).await?;
                if let Some(chain_progress) = progress.get_mut(&chain_id) {
                    chain_progress.current = common_ancestor.number;
                    chain_progress.current_timestamp = common_ancestor.timestamp;
                    let finalized = chain_progress.checkpoint(ProgressTag::Finalized);
                    self.upsert_row(chain_id, ancestor_end, ancestor_end, finalized).await?;
                }
            }
            RealtimeEvent::Finalize { chain_id, finalized } => {
                let checkpoint =
                    Checkpoint::block_end(finalized.timestamp, chain_id, finalized.number);
                // erase the reorg journal up to the finalized checkpoint
                self.runtime.finalize(checkpoint).await?;
                if let Some(chain_progress) = progress.get_mut(&chain_id) {
                    chain_progress.advance_finalized(finalized.number, finalized.timestamp);
                    let latest = chain_progress.checkpoint(ProgressTag::Current);
                    self.upsert_row(chain_id, latest, latest, checkpoint).await?;
                }
            }
            RealtimeEvent::Fatal { chain_id, reason } => {
                return Err(CoordinatorError::ChainFatal { chain_id, reason });
            }
        }
        Ok(())
    }

    /// Dispatches events to the runtime, retrying once on an
    /// invalid-event-access (the batch is re-fetched by the stream on the
    /// retry path) and bubbling non-retryable user errors.
    async fn index_events(&self, events: Vec<Event>, phase: Phase) -> Result<(), CoordinatorError> {
        if events.is_empty() {
            return Ok(());
        }
        let first = self.process(events.clone(), phase).await;
        match first {
            Ok(()) => Ok(()),
            Err(IndexingError::NonRetryableUserError(reason)) => Err(CoordinatorError::Indexing(
                IndexingError::NonRetryableUserError(reason),
            )),
            Err(error) => {
                warn!(%error, "indexing failed; retrying batch once");
                self.process(events, phase)
                    .await
                    .map_err(CoordinatorError::Indexing)
            }
        }
    }

    async fn process(&self, events: Vec<Event>, phase: Phase) -> Result<(), IndexingError> {
        match phase {
            Phase::Historical => self.runtime.process_historical_events(events).await,
            Phase::Realtime => self.runtime.process_realtime_events(events).await,
        }
    }

    async fn upsert_row(
        &self,
        chain_id: u64,
        latest: Checkpoint,
        safe: Checkpoint,
        finalized: Checkpoint,
    ) -> Result<(), CoordinatorError> {
        let chain_name = self
            .config
            .chain(chain_id)
            .map(|c| c.name().to_owned())
            .unwrap_or_default();
        self.store
            .upsert_checkpoint_row(CheckpointRow {
                chain_name,
                chain_id,
                latest_checkpoint: latest,
                safe_checkpoint: safe,
                finalized_checkpoint: finalized,
            })
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Historical,
    Realtime,
}

fn wall_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
