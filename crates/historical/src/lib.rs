//! Per-chain historical backfill for the eventide sync core.

mod ctx;
mod error;
mod handle;
mod queue;
mod split;
mod state;
mod task;

pub use error::HistoricalError;
pub use handle::{HistoricalHandle, HistoricalSyncBuilder};
