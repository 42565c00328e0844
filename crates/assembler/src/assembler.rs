//! Merging of per-chain event streams into one ordered stream.

use std::sync::Arc;

use eventide_common::{
    types::filter::Filter, Checkpoint, HistoricalBatch, RealtimeEvent, StoreError, SyncStore,
};
use eventide_config::Ordering;
use futures::{future::select_all, FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::{wrappers::ReceiverStream, StreamMap};
use tracing::info;

use crate::cursor::ChainCursor;

/// One assembled stream step.
#[derive(Debug)]
pub enum AssemblerEvent {
    /// A batch of ordered historical events.
    Historical(HistoricalBatch),
    /// Every chain's backfill has been fully emitted; realtime events
    /// follow.
    HistoricalComplete,
    /// A realtime event (block / reorg / finalize / fatal).
    Realtime(RealtimeEvent),
}

/// Inputs wiring one chain into the assembler.
#[derive(Debug)]
pub struct ChainFeed<TStore> {
    pub chain_id: u64,
    /// `(source index, filter)` pairs registered on the chain.
    pub sources: Vec<(usize, Filter)>,
    pub store: Arc<TStore>,
    /// Sealed-block watch of the chain's historical syncer.
    pub sealed_rx: watch::Receiver<Option<u64>>,
    /// Last block of the historical range (the finalized block at startup).
    pub end_block: u64,
    /// Crash-recovery checkpoint; events at or below it are not replayed.
    pub resume_after: Option<Checkpoint>,
    /// Realtime event stream of the chain.
    pub realtime_rx: mpsc::Receiver<RealtimeEvent>,
}

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    Historical,
    Realtime,
}

/// Merges per-chain historical and realtime streams under the configured
/// ordering policy.
#[derive(Debug)]
pub struct StreamAssembler<TStore> {
    ordering: Ordering,
    events_per_chunk: usize,
    cursors: Vec<ChainCursor<TStore>>,
    realtime: StreamMap<u64, ReceiverStream<RealtimeEvent>>,
    phase: Phase,
    round_robin: usize,
}

impl<TStore: SyncStore> StreamAssembler<TStore> {
    /// Builds the assembler from per-chain feeds.
    pub fn new(
        ordering: Ordering,
        events_per_chunk: usize,
        page_limit: usize,
        feeds: Vec<ChainFeed<TStore>>,
    ) -> Self {
        let mut cursors = Vec::with_capacity(feeds.len());
        let mut realtime = StreamMap::new();
        for feed in feeds {
            cursors.push(ChainCursor::new(
                feed.chain_id,
                feed.sources,
                feed.store,
                feed.sealed_rx,
                feed.end_block,
                feed.resume_after,
                page_limit,
            ));
            realtime.insert(feed.chain_id, ReceiverStream::new(feed.realtime_rx));
        }
        Self {
            ordering,
            events_per_chunk,
            cursors,
            realtime,
            phase: Phase::Historical,
            round_robin: 0,
        }
    }

    /// The next assembled event; `None` once every stream has ended.
    pub async fn next_event(&mut self) -> Result<Option<AssemblerEvent>, StoreError> {
        loop {
            match self.phase {
                Phase::Historical => {
                    if self.cursors.iter().all(|c| c.is_drained()) {
                        info!("historical stream complete; handing off to realtime");
                        self.phase = Phase::Realtime;
                        return Ok(Some(AssemblerEvent::HistoricalComplete));
                    }
                    let batch = match self.ordering {
                        Ordering::Omnichain => self.next_omnichain_batch().await?,
                        Ordering::Multichain => self.next_multichain_batch().await?,
                    };
                    match batch {
                        Some(batch) => return Ok(Some(AssemblerEvent::Historical(batch))),
                        // pending: no chain can emit until a peer advances
                        None => self.wait_any_sealed().await,
                    }
                }
                Phase::Realtime => {
                    return Ok(self
                        .realtime
                        .next()
                        .await
                        .map(|(_, event)| AssemblerEvent::Realtime(event)));
                }
            }
        }
    }

    /// Omnichain step: the chain holding the minimum current checkpoint
    /// emits events up to the minimum of its peers.
    async fn next_omnichain_batch(&mut self) -> Result<Option<HistoricalBatch>, StoreError> {
        let mut currents = Vec::with_capacity(self.cursors.len());
        for cursor in &mut self.cursors {
            currents.push(cursor.current_checkpoint().await?);
        }

        let Some(pick) = (0..self.cursors.len())
            .filter(|i| !self.cursors[*i].is_drained())
            .min_by_key(|i| currents[*i])
        else {
            return Ok(None);
        };

        let bound = currents
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pick)
            .map(|(_, checkpoint)| *checkpoint)
            .min()
            .unwrap_or(Checkpoint::MAX);

        let events = self.cursors[pick].take_until(bound, self.events_per_chunk);
        let Some(last) = events.last() else {
            return Ok(None);
        };
        Ok(Some(HistoricalBatch {
            chain_id: self.cursors[pick].chain_id,
            checkpoint: last.checkpoint,
            events,
        }))
    }

    /// Multichain step: any chain with buffered events emits, round-robin.
    async fn next_multichain_batch(&mut self) -> Result<Option<HistoricalBatch>, StoreError> {
        let count = self.cursors.len();
        for offset in 0..count {
            let index = (self.round_robin + offset) % count;
            let cursor = &mut self.cursors[index];
            if cursor.is_drained() {
                continue;
            }
            let _ = cursor.current_checkpoint().await?;
            let events = cursor.take_until(Checkpoint::MAX, self.events_per_chunk);
            if let Some(last) = events.last() {
                self.round_robin = (index + 1) % count;
                return Ok(Some(HistoricalBatch {
                    chain_id: cursor.chain_id,
                    checkpoint: last.checkpoint,
                    events,
                }));
            }
        }
        Ok(None)
    }

    async fn wait_any_sealed(&mut self) {
        let waits = self
            .cursors
            .iter_mut()
            .map(|cursor| cursor.sealed_changed().boxed());
        let _ = select_all(waits).await;
    }
}
