//! Default tuning constants.

/// Default head polling interval in milliseconds.
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1_000;

/// Default cap on the block span of one `eth_getLogs` request.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;

/// Default cap on concurrent historical RPC requests per chain.
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u64 = 50;

/// Soft event-count target of one inner historical chunk.
pub const DEFAULT_EVENTS_PER_CHUNK: usize = 93;

/// Block-count cap of one historical emission page.
pub const DEFAULT_EVENT_PAGE_BLOCKS: u64 = 10_000;

/// Per-table row limit of one event-range scan page.
pub const DEFAULT_EVENT_PAGE_LIMIT: usize = 10_000;

/// Maximum blocks queued while catching up to a skipped head.
pub const DEFAULT_MAX_QUEUED_BLOCKS: u64 = 25;

/// Child addresses batched into one `eth_getLogs` call.
pub const DEFAULT_CHILD_ADDRESS_BATCH_SIZE: usize = 50;

/// Worker retry backoff schedule in seconds; the final slot repeats.
pub const RETRY_SCHEDULE_SECS: [u64; 14] = [1, 2, 5, 10, 30, 60, 60, 60, 60, 60, 60, 60, 60, 60];

/// Wall-time budget of consecutive head-fetch failures before escalating.
pub const HEAD_FAILURE_BUDGET_SECS: u64 = 180;
