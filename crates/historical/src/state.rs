//! Backfill planning and seal bookkeeping.
//!
//! The state machine is synchronous and single-owner; the task layer feeds
//! it RPC completions and performs the store writes it hands back. Range
//! trackers advance when fetch tasks complete; a block becomes *sealed*
//! (rows + ledger interval durable) strictly in ascending order per source.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use eventide_common::{
    types::{
        filter::{Filter, LogFactory, LogFilter, TopicCriteria},
        interval::{chunks, intersection, BlockInterval, ProgressTracker},
        rpc,
    },
    AddressCriteria, BackfillProgress, FilterIntervals,
};
use tracing::{debug, warn};

use crate::queue::Task;

/// How a source is backfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourcePlan {
    /// Literal-address log source: `LogRange` tasks.
    Log,
    /// Factory-addressed log source: `ChildRange` tasks driven by the
    /// factory's own progress.
    FactoryLog { factory_id: String },
    /// Block-interval source: block callbacks only.
    Block,
    /// Trace, transfer, or transaction source: every required block is
    /// fetched and its derived rows filtered at seal time.
    BlockDerived,
}

#[derive(Debug)]
pub(crate) struct SourceState {
    pub source_index: usize,
    pub name: String,
    pub filter: Filter,
    pub plan: SourcePlan,
    pub start_block: u64,
    pub end_block: u64,
    pub max_block_range: u64,
    /// Fetch-level completion; gates block scheduling for log-ish plans.
    pub tracker: ProgressTracker,
    /// Last block sealed (rows + ledger durable); cached prefix counts.
    pub sealed_up_to: Option<u64>,
    /// Blocks awaiting fetch + seal, with the logs to persist there.
    pub pending_blocks: BTreeMap<u64, Vec<rpc::Log>>,
    /// Source starts beyond the finalized block; historical no-op.
    pub realtime_only: bool,
    cached_blocks: u64,
}

impl SourceState {
    fn is_active(&self) -> bool {
        !self.realtime_only
    }

    fn is_sealed_to_end(&self) -> bool {
        self.realtime_only || self.sealed_up_to == Some(self.end_block)
    }

    /// Registers blocks needing fetch, with the logs found there; the range
    /// end always gets a callback so the trailing gap is sealed.
    fn register_range(&mut self, to_block: u64, logs: Vec<rpc::Log>) {
        for log in logs {
            self.pending_blocks
                .entry(log.block_number)
                .or_default()
                .push(log);
        }
        self.pending_blocks.entry(to_block).or_default();
    }
}

#[derive(Debug)]
pub(crate) struct FactoryState {
    pub factory: LogFactory,
    /// The factory's creation-event scan as a ledger filter.
    pub scan_filter: Filter,
    pub tracker: ProgressTracker,
    /// Sources consuming this factory's children.
    pub consumers: Vec<usize>,
    /// Blocks up to which `ChildRange` tasks have been emitted.
    pub child_cursor: Option<u64>,
}

/// Writes the task layer must perform to seal one block.
#[derive(Debug)]
pub(crate) struct SealWork {
    pub block_number: u64,
    pub needs_traces: bool,
    pub needs_receipts: bool,
    pub entries: Vec<SealEntry>,
}

/// One source's share of a block seal.
#[derive(Debug)]
pub(crate) struct SealEntry {
    pub source_index: usize,
    pub kind: SealKind,
    /// Ledger interval sealed by this block for this source.
    pub interval: BlockInterval,
}

#[derive(Debug)]
pub(crate) enum SealKind {
    /// Persist these logs plus their transactions.
    Logs(Vec<rpc::Log>),
    /// Persist the block row only (block-interval source).
    Block,
    /// Persist filtered traces / transactions / receipts.
    Derived,
}

/// One chain's backfill state.
#[derive(Debug)]
pub(crate) struct HistoricalState {
    pub chain_id: u64,
    pub finalized_block: u64,
    pub sources: Vec<SourceState>,
    pub factories: HashMap<String, FactoryState>,
    fetched_blocks: BTreeMap<u64, rpc::Block>,
    scheduled_blocks: BTreeSet<u64>,
    total_cached: u64,
}

/// Inputs of [`HistoricalState::plan`], one per registered source.
#[derive(Debug, Clone)]
pub(crate) struct PlannedSource {
    pub source_index: usize,
    pub name: String,
    pub filter: Filter,
    pub max_block_range: u64,
}

impl HistoricalState {
    /// Builds the state from the interval ledger and emits the initial
    /// range tasks.
    pub(crate) fn plan(
        chain_id: u64,
        finalized_block: u64,
        planned: Vec<PlannedSource>,
        ledger: &HashMap<usize, FilterIntervals>,
        factory_ledger: &HashMap<String, Vec<BlockInterval>>,
    ) -> (Self, Vec<Task>) {
        let mut state = HistoricalState {
            chain_id,
            finalized_block,
            sources: Vec::new(),
            factories: HashMap::new(),
            fetched_blocks: BTreeMap::new(),
            scheduled_blocks: BTreeSet::new(),
            total_cached: 0,
        };
        let mut tasks = Vec::new();

        for source in planned {
            let start_block = source.filter.from_block();
            let end_block = source
                .filter
                .to_block()
                .unwrap_or(finalized_block)
                .min(finalized_block);

            if start_block > finalized_block {
                warn!(
                    source = %source.name,
                    %start_block,
                    %finalized_block,
                    "source starts beyond the finalized block; historical sync skipped"
                );
                state.sources.push(SourceState {
                    source_index: source.source_index,
                    name: source.name,
                    plan: plan_for(&source.filter),
                    filter: source.filter,
                    start_block,
                    end_block: start_block,
                    max_block_range: source.max_block_range,
                    tracker: ProgressTracker::new((start_block, start_block), &[]),
                    sealed_up_to: None,
                    pending_blocks: BTreeMap::new(),
                    realtime_only: true,
                    cached_blocks: 0,
                });
                continue;
            }

            let completed = ledger
                .get(&source.source_index)
                .map(|f| f.intervals.clone())
                .unwrap_or_default();
            let tracker = ProgressTracker::new((start_block, end_block), &completed);
            let cached_blocks = tracker.completed_count();
            let required = tracker.required();
            let plan = plan_for(&source.filter);

            let mut entry = SourceState {
                source_index: source.source_index,
                name: source.name,
                plan: plan.clone(),
                filter: source.filter,
                start_block,
                end_block,
                max_block_range: source.max_block_range,
                sealed_up_to: tracker.checkpoint(),
                tracker,
                pending_blocks: BTreeMap::new(),
                realtime_only: false,
                cached_blocks,
            };
            state.total_cached += cached_blocks;

            match &plan {
                SourcePlan::Log => {
                    for (from_block, to_block) in chunks(&required, entry.max_block_range) {
                        tasks.push(Task::LogRange {
                            source_index: entry.source_index,
                            from_block,
                            to_block,
                        });
                    }
                }
                SourcePlan::FactoryLog { factory_id } => {
                    let factory = entry
                        .filter
                        .factories()
                        .first()
                        .cloned()
                        .cloned()
                        .expect("factory-log plan implies a factory");
                    state.register_factory(
                        factory_id.clone(),
                        factory,
                        Some(entry.source_index),
                        factory_ledger,
                        &mut tasks,
                        entry.max_block_range,
                    );
                }
                SourcePlan::Block => {
                    if let Filter::Block(block_filter) = &entry.filter {
                        for (from_block, to_block) in &required {
                            let mut number = *from_block;
                            while number <= *to_block {
                                if block_filter.matches(number) {
                                    entry.pending_blocks.entry(number).or_default();
                                }
                                number += 1;
                            }
                            entry.pending_blocks.entry(*to_block).or_default();
                        }
                    }
                }
                SourcePlan::BlockDerived => {
                    for (from_block, to_block) in &required {
                        for number in *from_block..=*to_block {
                            entry.pending_blocks.entry(number).or_default();
                        }
                    }
                    // factories on trace-ish address dimensions still need
                    // their creation scans
                    for factory in entry.filter.factories() {
                        let factory = factory.clone();
                        state.register_factory(
                            factory.id(),
                            factory,
                            None,
                            factory_ledger,
                            &mut tasks,
                            entry.max_block_range,
                        );
                    }
                }
            }

            debug!(
                source = %entry.name,
                total = entry.tracker.total_count(),
                cached = cached_blocks,
                "planned historical source"
            );
            state.sources.push(entry);
        }

        (state, tasks)
    }

    fn register_factory(
        &mut self,
        factory_id: String,
        factory: LogFactory,
        consumer: Option<usize>,
        factory_ledger: &HashMap<String, Vec<BlockInterval>>,
        tasks: &mut Vec<Task>,
        max_block_range: u64,
    ) {
        if let Some(existing) = self.factories.get_mut(&factory_id) {
            existing.consumers.extend(consumer);
            return;
        }

        let start_block = factory.from_block;
        let end_block = factory
            .to_block
            .unwrap_or(self.finalized_block)
            .min(self.finalized_block);
        let completed = factory_ledger.get(&factory_id).cloned().unwrap_or_default();
        let tracker = ProgressTracker::new((start_block, end_block), &completed);

        for (from_block, to_block) in chunks(&tracker.required(), max_block_range) {
            tasks.push(Task::FactoryRange {
                factory_id: factory_id.clone(),
                from_block,
                to_block,
            });
        }

        let scan_filter = factory_scan_filter(&factory);
        self.factories.insert(
            factory_id,
            FactoryState {
                child_cursor: tracker.checkpoint(),
                scan_filter,
                factory,
                tracker,
                consumers: consumer.into_iter().collect(),
            },
        );
    }

    /// Records a completed log range fetch.
    pub(crate) fn on_log_range_complete(
        &mut self,
        source_index: usize,
        from_block: u64,
        to_block: u64,
        logs: Vec<rpc::Log>,
    ) {
        let source = &mut self.sources[source_index];
        source.register_range(to_block, logs);
        source.tracker.add_completed_interval((from_block, to_block));
    }

    /// Records a completed factory creation scan; returns the child tasks
    /// unlocked by the checkpoint advance.
    pub(crate) fn on_factory_range_complete(
        &mut self,
        factory_id: &str,
        from_block: u64,
        to_block: u64,
    ) -> Vec<Task> {
        let Some(factory) = self.factories.get_mut(factory_id) else {
            return Vec::new();
        };
        let update = factory.tracker.add_completed_interval((from_block, to_block));
        let Some(new_checkpoint) = update.new_checkpoint else {
            return Vec::new();
        };
        if !update.is_updated {
            return Vec::new();
        }

        let sealed_from = factory
            .child_cursor
            .map(|c| c + 1)
            .unwrap_or(factory.tracker.target().0);
        factory.child_cursor = Some(new_checkpoint);
        let sealed = (sealed_from, new_checkpoint);
        let consumers = factory.consumers.clone();

        let mut tasks = Vec::new();
        for source_index in consumers {
            let source = &self.sources[source_index];
            let wanted = intersection(&[sealed], &source.tracker.required());
            for (from_block, to_block) in chunks(&wanted, source.max_block_range) {
                tasks.push(Task::ChildRange {
                    source_index,
                    from_block,
                    to_block,
                });
            }
        }
        tasks
    }

    /// Records a completed child-address range fetch.
    pub(crate) fn on_child_range_complete(
        &mut self,
        source_index: usize,
        from_block: u64,
        to_block: u64,
        logs: Vec<rpc::Log>,
    ) {
        self.on_log_range_complete(source_index, from_block, to_block, logs);
    }

    /// Highest block number eligible for block tasks: the minimum fetch
    /// checkpoint across gating trackers. `None` means no block is eligible
    /// yet.
    fn gate(&self) -> Option<u64> {
        let mut gate: Option<u64> = None;
        let mut fold = |value: Option<u64>| match value {
            None => {
                gate = None;
                false
            }
            Some(v) => {
                gate = Some(gate.map_or(v, |g| g.min(v)));
                true
            }
        };

        for source in &self.sources {
            if !source.is_active() || source.tracker.is_complete() {
                // completed trackers registered all their callbacks and no
                // longer constrain block scheduling
                continue;
            }
            if matches!(source.plan, SourcePlan::Log | SourcePlan::FactoryLog { .. }) {
                let value = match source.tracker.checkpoint() {
                    Some(c) => Some(c),
                    None if source.start_block > 0 => Some(source.start_block - 1),
                    None => None,
                };
                if !fold(value) {
                    return None;
                }
            }
        }
        for factory in self.factories.values() {
            if factory.tracker.is_complete() {
                continue;
            }
            let value = match factory.tracker.checkpoint() {
                Some(c) => Some(c),
                None if factory.tracker.target().0 > 0 => Some(factory.tracker.target().0 - 1),
                None => None,
            };
            if !fold(value) {
                return None;
            }
        }

        // no gating trackers: everything up to the finalized block may go
        Some(gate.unwrap_or(self.finalized_block))
    }

    /// Pops the pending block numbers now eligible for fetching.
    pub(crate) fn eligible_block_tasks(&mut self) -> Vec<Task> {
        let Some(gate) = self.gate() else {
            return Vec::new();
        };

        let mut numbers: BTreeSet<u64> = BTreeSet::new();
        for source in &self.sources {
            numbers.extend(
                source
                    .pending_blocks
                    .range(..=gate)
                    .map(|(number, _)| *number),
            );
        }
        let mut tasks = Vec::new();
        for block_number in numbers {
            if self.scheduled_blocks.contains(&block_number)
                || self.fetched_blocks.contains_key(&block_number)
            {
                continue;
            }
            self.scheduled_blocks.insert(block_number);
            tasks.push(Task::Block { block_number });
        }
        tasks
    }

    /// Stores a fetched block for sealing.
    pub(crate) fn on_block_fetched(&mut self, block: rpc::Block) {
        self.scheduled_blocks.remove(&block.number);
        self.fetched_blocks.insert(block.number, block);
    }

    /// The next block to seal, strictly ascending: the globally smallest
    /// pending block, once fetched.
    pub(crate) fn next_seal(&self) -> Option<(rpc::Block, SealWork)> {
        let next = self
            .sources
            .iter()
            .filter_map(|s| s.pending_blocks.keys().next())
            .min()
            .copied()?;
        let block = self.fetched_blocks.get(&next)?.clone();

        let mut work = SealWork {
            block_number: next,
            needs_traces: false,
            needs_receipts: false,
            entries: Vec::new(),
        };
        for source in &self.sources {
            let Some(logs) = source.pending_blocks.get(&next) else {
                continue;
            };
            let interval_from = source
                .sealed_up_to
                .map(|s| s + 1)
                .unwrap_or(source.start_block)
                .min(next);
            let kind = match source.plan {
                SourcePlan::Log | SourcePlan::FactoryLog { .. } => SealKind::Logs(logs.clone()),
                SourcePlan::Block => SealKind::Block,
                SourcePlan::BlockDerived => {
                    work.needs_traces |= source.filter.requires_traces();
                    SealKind::Derived
                }
            };
            work.needs_receipts |= source.filter.requires_receipts();
            work.entries.push(SealEntry {
                source_index: source.source_index,
                kind,
                interval: (interval_from, next),
            });
        }
        Some((block, work))
    }

    /// Marks a block sealed for every source pending at it.
    pub(crate) fn complete_seal(&mut self, block_number: u64) {
        for source in &mut self.sources {
            if source.pending_blocks.remove(&block_number).is_none() {
                continue;
            }
            source.sealed_up_to = Some(block_number);
            if matches!(source.plan, SourcePlan::Block | SourcePlan::BlockDerived) {
                let from = source
                    .tracker
                    .checkpoint()
                    .map(|c| c + 1)
                    .unwrap_or(source.start_block)
                    .min(block_number);
                source.tracker.add_completed_interval((from, block_number));
            }
            // sources whose pending set drained are sealed to their end
            if source.pending_blocks.is_empty() && source.tracker.is_complete() {
                source.sealed_up_to = Some(source.end_block);
            }
        }
        if !self.sources.iter().any(|s| s.pending_blocks.contains_key(&block_number)) {
            self.fetched_blocks.remove(&block_number);
        }
    }

    /// The block through which every active source is sealed; events up to
    /// it may be emitted.
    pub(crate) fn emit_cursor(&self) -> Option<u64> {
        let mut cursor: Option<u64> = None;
        let mut any_active = false;
        for source in &self.sources {
            if !source.is_active() {
                continue;
            }
            any_active = true;
            // a source sealed to its own end stops constraining emission
            let sealed = if source.is_sealed_to_end() {
                self.finalized_block
            } else {
                source.sealed_up_to?
            };
            cursor = Some(cursor.map_or(sealed, |c| c.min(sealed)));
        }
        if !any_active {
            // nothing to backfill; the finalized block is trivially sealed
            return Some(self.finalized_block);
        }
        cursor
    }

    /// Whether every active source is fully sealed.
    pub(crate) fn is_complete(&self) -> bool {
        self.sources.iter().all(|s| s.is_sealed_to_end())
            && self
                .factories
                .values()
                .all(|f| f.tracker.is_complete() || f.tracker.total_count() == 0)
    }

    /// Aggregate backfill counters.
    pub(crate) fn progress(&self) -> BackfillProgress {
        let mut total = 0;
        let mut completed = 0;
        for source in &self.sources {
            if !source.is_active() {
                continue;
            }
            total += source.tracker.total_count();
            completed += source.tracker.completed_count() - source.cached_blocks;
        }
        BackfillProgress {
            total_blocks: total,
            cached_blocks: self.total_cached,
            completed_blocks: completed,
        }
    }
}

fn plan_for(filter: &Filter) -> SourcePlan {
    match filter {
        Filter::Log(LogFilter {
            address: AddressCriteria::Factory(factory),
            ..
        }) => SourcePlan::FactoryLog {
            factory_id: factory.id(),
        },
        Filter::Log(_) => SourcePlan::Log,
        Filter::Block(_) => SourcePlan::Block,
        Filter::Trace(_) | Filter::Transfer(_) | Filter::Transaction(_) => {
            SourcePlan::BlockDerived
        }
    }
}

/// The factory's creation scan expressed as a ledger filter.
pub(crate) fn factory_scan_filter(factory: &LogFactory) -> Filter {
    Filter::Log(LogFilter {
        chain_id: factory.chain_id,
        address: if factory.addresses.len() == 1 {
            AddressCriteria::One(factory.addresses[0])
        } else {
            AddressCriteria::Many(factory.addresses.clone())
        },
        topics: [
            TopicCriteria::One(factory.event_selector),
            TopicCriteria::Any,
            TopicCriteria::Any,
            TopicCriteria::Any,
        ],
        from_block: factory.from_block,
        to_block: factory.to_block,
        include_receipts: false,
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};
    use eventide_common::types::filter::ChildLocation;

    use super::*;

    const START: u64 = 16369950;
    const FINALIZED: u64 = 16369955;

    fn usdc() -> Address {
        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap()
    }

    fn usdc_filter(from_block: u64, to_block: Option<u64>) -> Filter {
        Filter::Log(LogFilter {
            chain_id: 1,
            address: AddressCriteria::One(usdc()),
            topics: [
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block,
            to_block,
            include_receipts: false,
        })
    }

    fn make_block(number: u64) -> rpc::Block {
        rpc::Block {
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::with_last_byte(number.wrapping_sub(1) as u8),
            number,
            timestamp: number * 12,
            miner: Address::ZERO,
            logs_bloom: Default::default(),
            state_root: B256::ZERO,
            transactions_root: B256::ZERO,
            receipts_root: B256::ZERO,
            difficulty: U256::ZERO,
            total_difficulty: None,
            gas_limit: 0,
            gas_used: 0,
            base_fee_per_gas: None,
            size: None,
            extra_data: Default::default(),
            mix_hash: None,
            nonce: None,
            transactions: vec![],
        }
    }

    fn make_log(number: u64, log_index: u64) -> rpc::Log {
        rpc::Log {
            address: usdc(),
            topics: vec![B256::repeat_byte(0x22)],
            data: Default::default(),
            block_number: number,
            block_hash: B256::with_last_byte(number as u8),
            transaction_hash: B256::repeat_byte(0x33),
            transaction_index: 0,
            log_index,
            removed: false,
        }
    }

    fn plan_usdc(ledger: &HashMap<usize, FilterIntervals>) -> (HistoricalState, Vec<Task>) {
        HistoricalState::plan(
            1,
            FINALIZED,
            vec![PlannedSource {
                source_index: 0,
                name: "usdc".to_owned(),
                filter: usdc_filter(START, None),
                max_block_range: 3,
            }],
            ledger,
            &HashMap::new(),
        )
    }

    #[test]
    fn test_plan_chunks_required_range() {
        let (state, tasks) = plan_usdc(&HashMap::new());

        assert_eq!(
            tasks,
            vec![
                Task::LogRange {
                    source_index: 0,
                    from_block: START,
                    to_block: START + 2,
                },
                Task::LogRange {
                    source_index: 0,
                    from_block: START + 3,
                    to_block: FINALIZED,
                },
            ]
        );

        let progress = state.progress();
        assert_eq!(progress.total_blocks, 6);
        assert_eq!(progress.cached_blocks, 0);
        assert_eq!(progress.cache_rate(), 0.0);
        assert_eq!(state.emit_cursor(), None);
    }

    #[test]
    fn test_full_backfill_seals_whole_range() {
        let (mut state, tasks) = plan_usdc(&HashMap::new());
        assert_eq!(tasks.len(), 2);

        // first range completes with one log per block
        state.on_log_range_complete(
            0,
            START,
            START + 2,
            (START..=START + 2).map(|n| make_log(n, 0)).collect(),
        );
        let first_blocks = state.eligible_block_tasks();
        assert_eq!(first_blocks.len(), 3);

        state.on_log_range_complete(
            0,
            START + 3,
            FINALIZED,
            (START + 3..=FINALIZED).map(|n| make_log(n, 0)).collect(),
        );
        let second_blocks = state.eligible_block_tasks();
        assert_eq!(second_blocks.len(), 3);
        // 6 block tasks in total, one per block of the range
        assert_eq!(first_blocks.len() + second_blocks.len(), 6);

        // blocks arrive out of order; sealing still runs in ascending order
        for number in (START..=FINALIZED).rev() {
            state.on_block_fetched(make_block(number));
        }

        let mut sealed_intervals: Vec<BlockInterval> = Vec::new();
        while let Some((block, work)) = state.next_seal() {
            assert_eq!(block.number, work.block_number);
            for entry in &work.entries {
                assert!(matches!(entry.kind, SealKind::Logs(_)));
                sealed_intervals.push(entry.interval);
            }
            state.complete_seal(work.block_number);
        }

        // the sealed intervals union to the whole range
        let mut union: Vec<BlockInterval> = Vec::new();
        for interval in sealed_intervals {
            union = eventide_common::types::interval::union(&union, &[interval]);
        }
        assert_eq!(union, vec![(START, FINALIZED)]);

        assert!(state.is_complete());
        assert_eq!(state.emit_cursor(), Some(FINALIZED));
        let progress = state.progress();
        assert_eq!(progress.completed_blocks, 6);
    }

    #[test]
    fn test_block_boundary_sealed_even_without_logs() {
        let (mut state, _) = plan_usdc(&HashMap::new());

        // no logs at all in the first chunk; the range end still gets a
        // block callback so the ledger covers it
        state.on_log_range_complete(0, START, START + 2, vec![]);
        let blocks = state.eligible_block_tasks();
        assert_eq!(blocks, vec![Task::Block { block_number: START + 2 }]);

        state.on_block_fetched(make_block(START + 2));
        let (_, work) = state.next_seal().unwrap();
        assert_eq!(work.entries[0].interval, (START, START + 2));
    }

    #[test]
    fn test_fully_cached_source_needs_no_work() {
        let mut ledger = HashMap::new();
        ledger.insert(
            0,
            FilterIntervals {
                filter: usdc_filter(START, None),
                fragments: vec![],
                intervals: vec![(START, FINALIZED)],
            },
        );

        let (state, tasks) = plan_usdc(&ledger);
        assert!(tasks.is_empty());
        assert!(state.is_complete());
        assert_eq!(state.emit_cursor(), Some(FINALIZED));
        assert_eq!(state.progress().cache_rate(), 1.0);
    }

    #[test]
    fn test_source_beyond_finalized_is_realtime_only() {
        let (state, tasks) = HistoricalState::plan(
            1,
            FINALIZED,
            vec![PlannedSource {
                source_index: 0,
                name: "future".to_owned(),
                filter: usdc_filter(FINALIZED + 1, None),
                max_block_range: 3,
            }],
            &HashMap::new(),
            &HashMap::new(),
        );

        assert!(tasks.is_empty());
        assert!(state.sources[0].realtime_only);
        assert!(state.is_complete());
        assert_eq!(state.progress().total_blocks, 0);
    }

    #[test]
    fn test_factory_checkpoint_unlocks_child_tasks() {
        let factory = LogFactory {
            chain_id: 1,
            addresses: vec![Address::repeat_byte(0xaa)],
            event_selector: B256::repeat_byte(0x11),
            child_location: ChildLocation::Topic1,
            from_block: START,
            to_block: None,
        };
        let filter = Filter::Log(LogFilter {
            chain_id: 1,
            address: AddressCriteria::Factory(factory.clone()),
            topics: [
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block: START,
            to_block: None,
            include_receipts: false,
        });

        let (mut state, tasks) = HistoricalState::plan(
            1,
            FINALIZED,
            vec![PlannedSource {
                source_index: 0,
                name: "pool".to_owned(),
                filter,
                max_block_range: 3,
            }],
            &HashMap::new(),
            &HashMap::new(),
        );

        // the factory scan is planned; the child scans wait on it
        assert_eq!(
            tasks,
            vec![
                Task::FactoryRange {
                    factory_id: factory.id(),
                    from_block: START,
                    to_block: START + 2,
                },
                Task::FactoryRange {
                    factory_id: factory.id(),
                    from_block: START + 3,
                    to_block: FINALIZED,
                },
            ]
        );
        assert!(state.eligible_block_tasks().is_empty());

        // out-of-order completion does not unlock children
        let unlocked = state.on_factory_range_complete(&factory.id(), START + 3, FINALIZED);
        assert!(unlocked.is_empty());

        // prefix completion unlocks the whole sealed span
        let unlocked = state.on_factory_range_complete(&factory.id(), START, START + 2);
        assert_eq!(
            unlocked,
            vec![
                Task::ChildRange {
                    source_index: 0,
                    from_block: START,
                    to_block: START + 2,
                },
                Task::ChildRange {
                    source_index: 0,
                    from_block: START + 3,
                    to_block: FINALIZED,
                },
            ]
        );
    }
}
