//! Shared context of the historical sync task.

use std::sync::Arc;

use eventide_common::BackfillProgress;
use eventide_config::ChainParams;
use tokio::sync::watch;

pub(crate) struct HistoricalCtx<TClient, TStore> {
    pub client: Arc<TClient>,
    pub store: Arc<TStore>,
    pub chain: Arc<ChainParams>,
    pub progress_tx: watch::Sender<BackfillProgress>,
    /// Highest block through which every source is sealed.
    pub sealed_tx: watch::Sender<Option<u64>>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub child_batch_size: usize,
    pub max_concurrency: usize,
}

impl<TClient, TStore> HistoricalCtx<TClient, TStore> {
    /// Publishes progress counters to watchers.
    pub(crate) fn notify_progress(&self, progress: BackfillProgress) {
        let _ = self.progress_tx.send(progress);
    }

    /// Publishes the sealed cursor to watchers.
    pub(crate) fn notify_sealed(&self, sealed: Option<u64>) {
        self.sealed_tx.send_if_modified(|current| {
            if *current == sealed {
                false
            } else {
                *current = sealed;
                true
            }
        });
    }
}
