//! Per-chain parameters, immutable for the lifetime of a run.

use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_MAX_REQUESTS_PER_SECOND, DEFAULT_POLLING_INTERVAL_MS};

/// Chain-specific config that must remain constant across a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    /// Human-readable chain name (`"mainnet"`, `"polygon"`, ...).
    name: String,

    /// Chain id.
    id: u64,

    /// Head polling interval in milliseconds.
    polling_interval_ms: u64,

    /// Number of blocks behind head considered final.
    finality_block_count: u64,

    /// Effective RPC parallelism budget.
    max_requests_per_second: u64,

    /// RPC endpoint URL.
    rpc_url: String,

    /// Bypass the RPC response cache for this chain.
    disable_cache: bool,
}

impl ChainParams {
    /// Creates chain parameters.
    pub fn new(
        name: impl Into<String>,
        id: u64,
        finality_block_count: u64,
        rpc_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            finality_block_count,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            rpc_url: rpc_url.into(),
            disable_cache: false,
        }
    }

    /// Overrides the polling interval.
    pub fn with_polling_interval_ms(mut self, value: u64) -> Self {
        self.polling_interval_ms = value;
        self
    }

    /// Overrides the request budget.
    pub fn with_max_requests_per_second(mut self, value: u64) -> Self {
        self.max_requests_per_second = value;
        self
    }

    /// Disables the RPC response cache.
    pub fn with_cache_disabled(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    /// Chain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chain id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Head polling interval in milliseconds.
    pub fn polling_interval_ms(&self) -> u64 {
        self.polling_interval_ms
    }

    /// Finality depth in blocks.
    pub fn finality_block_count(&self) -> u64 {
        self.finality_block_count
    }

    /// Effective RPC parallelism budget.
    pub fn max_requests_per_second(&self) -> u64 {
        self.max_requests_per_second
    }

    /// RPC endpoint URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Whether the RPC response cache is bypassed.
    pub fn cache_disabled(&self) -> bool {
        self.disable_cache
    }
}
