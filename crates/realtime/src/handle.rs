//! Builder and handle of the per-chain realtime syncer.

use std::{collections::HashMap, future::Future, sync::Arc};

use eventide_common::{
    types::filter::{ChildAddresses, Filter},
    EthClient, LightBlock, RealtimeEvent, StoreError, SyncStore,
};
use eventide_config::{defaults::DEFAULT_MAX_QUEUED_BLOCKS, ChainParams, Source};
use tokio::sync::{mpsc, watch, Mutex};

use crate::{
    ctx::RealtimeCtx,
    error::RealtimeError,
    state::RealtimeState,
    task::realtime_sync_task,
};

/// Queue depth of the realtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handle for consuming a chain's realtime events.
#[derive(Debug)]
pub struct RealtimeHandle {
    event_rx: mpsc::Receiver<RealtimeEvent>,
}

impl RealtimeHandle {
    /// Takes the event stream receiver.
    pub fn into_events(self) -> mpsc::Receiver<RealtimeEvent> {
        self.event_rx
    }
}

/// Builder for a chain's realtime syncer.
#[derive(Debug)]
pub struct RealtimeSyncBuilder<TClient, TStore> {
    chain: Arc<ChainParams>,
    client: Arc<TClient>,
    store: Arc<TStore>,
    sources: Vec<(usize, Source)>,
    finalized: LightBlock,
    shutdown_rx: watch::Receiver<bool>,
    max_queued_blocks: u64,
}

impl<TClient, TStore> RealtimeSyncBuilder<TClient, TStore>
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
        finalized: LightBlock,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain,
            client,
            store,
            sources,
            finalized,
            shutdown_rx,
            max_queued_blocks: DEFAULT_MAX_QUEUED_BLOCKS,
        }
    }

    /// Overrides the gap-fill queue cap.
    pub fn with_max_queued_blocks(mut self, value: u64) -> Self {
        self.max_queued_blocks = value;
        self
    }

    /// Seeds the in-memory child sets from the store and returns the handle
    /// plus the task to drive.
    pub async fn build(
        self,
    ) -> Result<
        (
            RealtimeHandle,
            impl Future<Output = Result<(), RealtimeError>>,
        ),
        StoreError,
    > {
        let filters: Vec<(usize, Filter)> = self
            .sources
            .iter()
            .map(|(index, source)| (*index, source.filter().clone()))
            .collect();

        let mut children: HashMap<String, ChildAddresses> = HashMap::new();
        for (_, filter) in &filters {
            for factory in filter.factories() {
                let id = factory.id();
                if children.contains_key(&id) {
                    continue;
                }
                let set = self.store.get_child_addresses(factory.clone()).await?;
                children.insert(id, set);
            }
        }

        let state = RealtimeState::new(self.finalized, children);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = RealtimeCtx {
            client: self.client,
            store: self.store,
            chain: self.chain,
            sources: filters,
            event_tx,
            shutdown_rx: self.shutdown_rx,
            reconcile_lock: Mutex::new(()),
            max_queued_blocks: self.max_queued_blocks,
        };

        let handle = RealtimeHandle { event_rx };
        let task = realtime_sync_task(state, ctx);
        Ok((handle, task))
    }
}
