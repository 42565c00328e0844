//! Shared context of the realtime sync task.

use std::sync::Arc;

use eventide_common::{types::filter::Filter, RealtimeEvent};
use eventide_config::ChainParams;
use tokio::sync::{mpsc, watch, Mutex};

pub(crate) struct RealtimeCtx<TClient, TStore> {
    pub client: Arc<TClient>,
    pub store: Arc<TStore>,
    pub chain: Arc<ChainParams>,
    /// `(source index, filter)` pairs registered on this chain.
    pub sources: Vec<(usize, Filter)>,
    pub event_tx: mpsc::Sender<RealtimeEvent>,
    pub shutdown_rx: watch::Receiver<bool>,
    /// Single-slot mutex serializing block reconciliation.
    pub reconcile_lock: Mutex<()>,
    pub max_queued_blocks: u64,
}
