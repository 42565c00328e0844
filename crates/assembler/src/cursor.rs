//! Per-chain historical event cursor.
//!
//! Pages sealed event rows out of the store, turning them into ordered
//! [`Event`]s. The cursor never reads past the chain's sealed block, so
//! everything it buffers is durable.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use eventide_common::{
    build_events,
    types::filter::{ChildAddresses, Filter},
    Checkpoint, Event, EventBlockRequest, StoreError, SyncStore,
};
use eventide_config::defaults::DEFAULT_EVENT_PAGE_BLOCKS;
use tokio::sync::watch;
use tracing::debug;

/// One chain's historical emission state.
#[derive(Debug)]
pub(crate) struct ChainCursor<TStore> {
    pub chain_id: u64,
    pub sources: Vec<(usize, Filter)>,
    store: Arc<TStore>,
    sealed_rx: watch::Receiver<Option<u64>>,
    /// Historical target; the cursor is complete once this block is emitted.
    end_block: u64,
    /// Last block fully turned into buffered events.
    covered_block: Option<u64>,
    /// Events at or below this checkpoint were already consumed before a
    /// restart and must not be replayed.
    resume_after: Option<Checkpoint>,
    page_limit: usize,
    buffer: VecDeque<Event>,
    children: HashMap<String, ChildAddresses>,
    children_loaded: bool,
}

impl<TStore: SyncStore> ChainCursor<TStore> {
    pub(crate) fn new(
        chain_id: u64,
        sources: Vec<(usize, Filter)>,
        store: Arc<TStore>,
        sealed_rx: watch::Receiver<Option<u64>>,
        end_block: u64,
        resume_after: Option<Checkpoint>,
        page_limit: usize,
    ) -> Self {
        let covered_block = resume_after.map(|cp| cp.block_number.saturating_sub(1));
        Self {
            chain_id,
            sources,
            store,
            sealed_rx,
            end_block,
            covered_block,
            resume_after,
            page_limit,
            buffer: VecDeque::new(),
            children: HashMap::new(),
            children_loaded: false,
        }
    }

    /// The sealed block reported by the historical syncer.
    fn sealed_block(&self) -> Option<u64> {
        *self.sealed_rx.borrow()
    }

    /// Waits until the sealed cursor moves. A closed watch (syncer task
    /// finished) degrades to a slow poll instead of a hot spin.
    pub(crate) async fn sealed_changed(&mut self) {
        if self.sealed_rx.changed().await.is_err() {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Whether every historical event has been handed out.
    pub(crate) fn is_drained(&self) -> bool {
        self.buffer.is_empty() && self.covered_block == Some(self.end_block)
    }

    /// Checkpoint of the next buffered event, or the upper bound of the
    /// covered span when the buffer is drained.
    pub(crate) async fn current_checkpoint(&mut self) -> Result<Checkpoint, StoreError> {
        self.refill().await?;
        if let Some(event) = self.buffer.front() {
            return Ok(event.checkpoint);
        }
        if self.covered_block == Some(self.end_block) {
            return Ok(Checkpoint::MAX);
        }
        match self.covered_block {
            None => Ok(Checkpoint::ZERO),
            Some(number) => match self.store.get_block(self.chain_id, number).await? {
                Some(block) => Ok(Checkpoint::block_end(
                    block.timestamp,
                    self.chain_id,
                    number,
                )),
                // ledgered but row-less boundary blocks cannot order events
                // beyond themselves; hold the frontier at zero progress
                None => Ok(Checkpoint::ZERO),
            },
        }
    }

    /// Pops events at or below `bound`, up to `max_events`.
    pub(crate) fn take_until(&mut self, bound: Checkpoint, max_events: usize) -> Vec<Event> {
        let mut out = Vec::new();
        while out.len() < max_events {
            match self.buffer.front() {
                Some(event) if event.checkpoint <= bound => {
                    out.push(self.buffer.pop_front().expect("front just checked"));
                }
                _ => break,
            }
        }
        out
    }

    /// Fills the buffer from the store while it is empty and sealed blocks
    /// remain uncovered.
    async fn refill(&mut self) -> Result<(), StoreError> {
        if !self.buffer.is_empty() {
            return Ok(());
        }
        let Some(sealed) = self.sealed_block() else {
            return Ok(());
        };

        if !self.children_loaded {
            for (_, filter) in &self.sources {
                for factory in filter.factories() {
                    let id = factory.id();
                    if !self.children.contains_key(&id) {
                        let set = self.store.get_child_addresses(factory.clone()).await?;
                        self.children.insert(id, set);
                    }
                }
            }
            self.children_loaded = true;
        }

        while self.buffer.is_empty() {
            let from_block = match self.covered_block {
                Some(covered) if covered >= sealed => return Ok(()),
                Some(covered) => covered + 1,
                None => self
                    .sources
                    .iter()
                    .map(|(_, f)| f.from_block())
                    .min()
                    .unwrap_or(0),
            };
            if from_block > sealed {
                if sealed >= self.end_block {
                    // every source starts beyond the historical range
                    self.covered_block = Some(self.end_block);
                }
                return Ok(());
            }

            // row limit plus a block-count cap bound one page
            let to_block = sealed.min(from_block.saturating_add(DEFAULT_EVENT_PAGE_BLOCKS - 1));
            let page = self
                .store
                .get_event_block_data(EventBlockRequest {
                    chain_id: self.chain_id,
                    filters: self.sources.clone(),
                    from_block,
                    to_block,
                    limit: self.page_limit,
                })
                .await?;

            let Some(cursor) = page.cursor else {
                self.covered_block = Some(to_block);
                continue;
            };

            for (_, rows) in &page.blocks {
                let mut events = build_events(&self.sources, rows, &self.children);
                if let Some(resume_after) = self.resume_after {
                    events.retain(|e| e.checkpoint > resume_after);
                }
                self.buffer.extend(events);
            }
            self.covered_block = Some(cursor);
            debug!(
                chain_id = self.chain_id,
                covered = cursor,
                buffered = self.buffer.len(),
                "paged historical events"
            );
        }
        Ok(())
    }
}
