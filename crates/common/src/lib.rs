//! Shared types and trait seams of the eventide sync core.

pub mod traits;
pub mod types;

pub use traits::{
    eth_client::{
        block_by_number_checked, logs_at_hash_checked, BlockTag, EthClient, EthClientError,
        LogQuery,
    },
    indexing::{IndexingError, IndexingRuntime},
    store::{
        CheckpointRow, EventBlockPage, EventBlockRequest, FilterIntervals, FragmentIntervals,
        RpcCacheEntry, StoreError, SyncStore,
    },
};
#[cfg(feature = "test-utils")]
pub use traits::{
    eth_client::MockEthClient, indexing::MockIndexingRuntime, store::MockSyncStore,
};
pub use types::{
    builder::build_events,
    checkpoint::{Checkpoint, EventKind},
    events::{
        BackfillProgress, BlockEventData, BlockEventRows, Event, HistoricalBatch, RealtimeEvent,
    },
    filter::{
        AddressCriteria, BlockFilter, ChildAddresses, ChildLocation, Filter, LogFactory,
        LogFilter, Selector, TopicCriteria, TraceFilter, TransactionFilter, TransferFilter,
    },
    fragment::{fragments, Fragment, FragmentAddress},
    interval::{BlockInterval, ProgressTracker, ProgressUpdate},
    records::{
        flatten_traces, BlockRecord, LightBlock, LogRecord, ReceiptRecord, TraceRecord,
        TransactionRecord,
    },
};
