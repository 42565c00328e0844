//! Run configuration: chains, sources, and stream ordering.

use std::sync::Arc;

use eventide_common::types::filter::Filter;
use serde::{Deserialize, Serialize};

use crate::{
    defaults::{DEFAULT_EVENTS_PER_CHUNK, DEFAULT_EVENT_PAGE_BLOCKS, DEFAULT_MAX_BLOCK_RANGE},
    ChainParams,
};

/// Cross-chain ordering policy of the assembled event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordering {
    /// Global checkpoint order across chains.
    Omnichain,
    /// Per-chain independent order.
    Multichain,
}

/// One registered event source: a filter plus per-source overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Name used in logs and progress reporting.
    name: String,

    /// The source's filter.
    filter: Filter,

    /// Per-source override of the `eth_getLogs` range cap.
    max_block_range: Option<u64>,
}

impl Source {
    /// Creates a source.
    pub fn new(name: impl Into<String>, filter: Filter) -> Self {
        Self {
            name: name.into(),
            filter,
            max_block_range: None,
        }
    }

    /// Overrides the range cap for this source.
    pub fn with_max_block_range(mut self, value: u64) -> Self {
        self.max_block_range = Some(value);
        self
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source's filter.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Effective range cap given a chain default.
    pub fn max_block_range(&self, chain_default: u64) -> u64 {
        self.max_block_range.unwrap_or(chain_default)
    }
}

/// Whole-run sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    chains: Vec<Arc<ChainParams>>,
    sources: Vec<Source>,
    ordering: Ordering,
    max_block_range: u64,
    events_per_chunk: usize,
    event_page_blocks: u64,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    pub fn new(chains: Vec<ChainParams>, sources: Vec<Source>, ordering: Ordering) -> Self {
        Self {
            chains: chains.into_iter().map(Arc::new).collect(),
            sources,
            ordering,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            events_per_chunk: DEFAULT_EVENTS_PER_CHUNK,
            event_page_blocks: DEFAULT_EVENT_PAGE_BLOCKS,
        }
    }

    /// Overrides the chain-wide range cap.
    pub fn with_max_block_range(mut self, value: u64) -> Self {
        self.max_block_range = value;
        self
    }

    /// Overrides the inner event chunk size.
    pub fn with_events_per_chunk(mut self, value: usize) -> Self {
        self.events_per_chunk = value;
        self
    }

    /// All configured chains.
    pub fn chains(&self) -> &[Arc<ChainParams>] {
        &self.chains
    }

    /// Finds a chain by id.
    pub fn chain(&self, chain_id: u64) -> Option<&Arc<ChainParams>> {
        self.chains.iter().find(|c| c.id() == chain_id)
    }

    /// All registered sources.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// The sources registered on one chain, with their global indexes.
    pub fn sources_for_chain(&self, chain_id: u64) -> Vec<(usize, &Source)> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.filter().chain_id() == chain_id)
            .collect()
    }

    /// The stream ordering policy.
    pub fn ordering(&self) -> Ordering {
        self.ordering
    }

    /// Chain-wide `eth_getLogs` range cap.
    pub fn max_block_range(&self) -> u64 {
        self.max_block_range
    }

    /// Soft event-count target of one inner historical chunk.
    pub fn events_per_chunk(&self) -> usize {
        self.events_per_chunk
    }

    /// Block-count cap of one historical emission page.
    pub fn event_page_blocks(&self) -> u64 {
        self.event_page_blocks
    }
}
