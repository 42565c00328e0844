//! Event records and the closed unions flowing between sync tasks.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::oneshot;

use super::{
    checkpoint::{Checkpoint, EventKind},
    filter::ChildAddresses,
    records::{BlockRecord, LightBlock, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord},
};

/// A fully-assembled event handed to the indexing runtime.
#[derive(Debug, Clone)]
pub struct Event {
    pub chain_id: u64,
    /// Index of the source (filter) this event matched.
    pub source_index: usize,
    pub checkpoint: Checkpoint,
    pub kind: EventKind,
    pub block: Arc<BlockRecord>,
    pub log: Option<LogRecord>,
    pub transaction: Option<TransactionRecord>,
    pub transaction_receipt: Option<ReceiptRecord>,
    pub trace: Option<TraceRecord>,
}

/// All rows of one block relevant to the registered filters.
#[derive(Debug, Clone, Default)]
pub struct BlockEventRows {
    pub block: Option<BlockRecord>,
    pub logs: Vec<LogRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub receipts: Vec<ReceiptRecord>,
    pub traces: Vec<TraceRecord>,
}

/// Payload of a realtime `block` event.
#[derive(Debug)]
pub struct BlockEventData {
    pub chain_id: u64,
    pub block: BlockRecord,
    pub logs: Vec<LogRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub receipts: Vec<ReceiptRecord>,
    pub traces: Vec<TraceRecord>,
    /// Fully-matched events of this block, checkpoint order.
    pub events: Vec<Event>,
    /// Factory-id keyed child addresses first seen in this block.
    pub child_addresses: HashMap<String, ChildAddresses>,
    /// Source indexes whose filter matched something in this block.
    pub matched_sources: Vec<usize>,
    /// Whether any registered filter matched.
    pub has_matched_filter: bool,
}

/// Realtime sync output, one closed union instead of string channels.
#[derive(Debug)]
pub enum RealtimeEvent {
    /// A new canonical block with its matched event rows. The consumer must
    /// fire `ack` once the block is durably processed; the syncer gates the
    /// next poll on it.
    Block {
        data: Box<BlockEventData>,
        ack: oneshot::Sender<bool>,
    },
    /// The local chain above `common_ancestor` was replaced.
    Reorg {
        chain_id: u64,
        common_ancestor: LightBlock,
        reorged_blocks: Vec<LightBlock>,
    },
    /// Blocks up to `finalized` can no longer reorg.
    Finalize { chain_id: u64, finalized: LightBlock },
    /// Unrecoverable condition (deep reorg past finality, retries exhausted).
    Fatal { chain_id: u64, reason: String },
}

/// One historical batch of globally-ordered events.
#[derive(Debug)]
pub struct HistoricalBatch {
    /// Chain the batch was drained from (omnichain batches interleave
    /// chains and set this to the chain of the minimum cursor).
    pub chain_id: u64,
    pub events: Vec<Event>,
    /// Largest checkpoint in the batch.
    pub checkpoint: Checkpoint,
}

/// Progress snapshot of one chain's backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillProgress {
    pub total_blocks: u64,
    pub cached_blocks: u64,
    pub completed_blocks: u64,
}

impl BackfillProgress {
    /// Fraction of the target already cached when the backfill started.
    pub fn cache_rate(&self) -> f64 {
        if self.total_blocks == 0 {
            1.0
        } else {
            self.cached_blocks as f64 / self.total_blocks as f64
        }
    }

    /// Remaining blocks to fetch.
    pub fn remaining_blocks(&self) -> u64 {
        self.total_blocks
            .saturating_sub(self.cached_blocks)
            .saturating_sub(self.completed_blocks)
    }

    /// ETA estimate; `None` until at least 3 blocks completed.
    pub fn eta(&self, elapsed: std::time::Duration) -> Option<std::time::Duration> {
        if self.completed_blocks < 3 {
            return None;
        }
        let per_block = elapsed.as_secs_f64() / self.completed_blocks as f64;
        Some(std::time::Duration::from_secs_f64(
            per_block * self.remaining_blocks() as f64,
        ))
    }
}
