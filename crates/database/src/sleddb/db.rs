//! Blocking sled implementation of the sync store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use eventide_common::{
    types::{
        events::BlockEventRows,
        filter::{
            BlockFilter, ChildAddresses, Filter, LogFilter, TraceFilter, TransactionFilter,
            TransferFilter,
        },
        fragment::fragments,
        interval::{intersection_many, union, BlockInterval},
        records::{BlockRecord, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord},
    },
    CheckpointRow, EventBlockPage, EventBlockRequest, FilterIntervals, FragmentIntervals,
    LogFactory, RpcCacheEntry,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::{
    cache_key::request_hash,
    error::{DbError, DbResult},
    keys,
};

mod tree_names {
    pub(super) const BLOCKS: &str = "blocks";
    pub(super) const BLOCKS_BY_HASH: &str = "blocks_by_hash";
    pub(super) const LOGS: &str = "logs";
    pub(super) const TRANSACTIONS: &str = "transactions";
    pub(super) const RECEIPTS: &str = "transaction_receipts";
    pub(super) const TRACES: &str = "traces";
    pub(super) const INTERVALS: &str = "intervals";
    pub(super) const FACTORIES: &str = "factories";
    pub(super) const FACTORY_ADDRESSES: &str = "factory_addresses";
    pub(super) const RPC_CACHE: &str = "rpc_request_results";
    pub(super) const RPC_CACHE_BY_BLOCK: &str = "rpc_request_results_by_block";
    pub(super) const CHECKPOINTS: &str = "checkpoints";
}

/// One interval-ledger row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IntervalRow {
    chain_id: u64,
    blocks: Vec<BlockInterval>,
}

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(tree: &'static str, bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::corrupt(tree, e))
}

/// The sled-backed sync store.
///
/// Read-modify-write paths (interval ledger, factory children) serialize
/// through a store-wide write lock.
///
/// NOTE: sled transactions cannot span range scans, so multi-tree pruning
/// deletes ledger rows before data rows; a crash in between leaves orphan
/// data rows which the idempotent upserts re-cover on the next scan.
pub(crate) struct SyncDb {
    blocks: sled::Tree,
    blocks_by_hash: sled::Tree,
    logs: sled::Tree,
    transactions: sled::Tree,
    receipts: sled::Tree,
    traces: sled::Tree,
    intervals: sled::Tree,
    factories: sled::Tree,
    factory_addresses: sled::Tree,
    rpc_cache: sled::Tree,
    rpc_cache_by_block: sled::Tree,
    checkpoints: sled::Tree,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for SyncDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDb").finish_non_exhaustive()
    }
}

impl SyncDb {
    pub(crate) fn open(db: &sled::Db) -> DbResult<Self> {
        Ok(Self {
            blocks: db.open_tree(tree_names::BLOCKS)?,
            blocks_by_hash: db.open_tree(tree_names::BLOCKS_BY_HASH)?,
            logs: db.open_tree(tree_names::LOGS)?,
            transactions: db.open_tree(tree_names::TRANSACTIONS)?,
            receipts: db.open_tree(tree_names::RECEIPTS)?,
            traces: db.open_tree(tree_names::TRACES)?,
            intervals: db.open_tree(tree_names::INTERVALS)?,
            factories: db.open_tree(tree_names::FACTORIES)?,
            factory_addresses: db.open_tree(tree_names::FACTORY_ADDRESSES)?,
            rpc_cache: db.open_tree(tree_names::RPC_CACHE)?,
            rpc_cache_by_block: db.open_tree(tree_names::RPC_CACHE_BY_BLOCK)?,
            checkpoints: db.open_tree(tree_names::CHECKPOINTS)?,
            write_lock: Mutex::new(()),
        })
    }

    // interval ledger

    pub(crate) fn insert_intervals(
        &self,
        chain_id: u64,
        entries: Vec<(Filter, BlockInterval)>,
    ) -> DbResult<()> {
        let _guard = self.write_lock.lock();

        for (filter, interval) in entries {
            if interval.0 > interval.1 {
                warn!(?interval, "skipping inverted ledger interval");
                continue;
            }
            for fragment in fragments(&filter) {
                let id = fragment.id();
                let mut row = match self.intervals.get(id.as_bytes())? {
                    Some(bytes) => decode::<IntervalRow>(tree_names::INTERVALS, &bytes)?,
                    None => IntervalRow {
                        chain_id,
                        blocks: Vec::new(),
                    },
                };
                row.blocks = union(&row.blocks, &[interval]);
                self.intervals.insert(id.as_bytes(), encode(&row)?)?;
            }
        }
        Ok(())
    }

    pub(crate) fn get_intervals(&self, filters: Vec<Filter>) -> DbResult<Vec<FilterIntervals>> {
        let mut out = Vec::with_capacity(filters.len());

        for filter in filters {
            let mut fragment_intervals = Vec::new();
            for fragment in fragments(&filter) {
                let mut covered: Vec<BlockInterval> = Vec::new();
                for id in fragment.adjacent_ids() {
                    if let Some(bytes) = self.intervals.get(id.as_bytes())? {
                        let row = decode::<IntervalRow>(tree_names::INTERVALS, &bytes)?;
                        covered = union(&covered, &row.blocks);
                    }
                }
                fragment_intervals.push(FragmentIntervals {
                    fragment,
                    intervals: covered,
                });
            }

            let intervals = intersection_many(
                &fragment_intervals
                    .iter()
                    .map(|f| f.intervals.clone())
                    .collect::<Vec<_>>(),
            );
            out.push(FilterIntervals {
                filter,
                fragments: fragment_intervals,
                intervals,
            });
        }
        Ok(out)
    }

    // record upserts

    pub(crate) fn insert_blocks(&self, blocks: Vec<BlockRecord>) -> DbResult<()> {
        for block in blocks {
            let key = keys::block_key(block.chain_id, block.number);
            self.blocks.insert(key, encode(&block)?)?;
            self.blocks_by_hash.insert(
                keys::block_hash_key(block.chain_id, &block.hash),
                encode(&block.number)?,
            )?;
        }
        Ok(())
    }

    pub(crate) fn get_block(&self, chain_id: u64, number: u64) -> DbResult<Option<BlockRecord>> {
        match self.blocks.get(keys::block_key(chain_id, number))? {
            Some(bytes) => Ok(Some(decode(tree_names::BLOCKS, &bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn insert_logs(&self, logs: Vec<LogRecord>) -> DbResult<()> {
        for log in logs {
            let key = keys::row_key(log.chain_id, log.block_number, log.log_index);
            self.logs.insert(key, encode(&log)?)?;
        }
        Ok(())
    }

    pub(crate) fn insert_transactions(&self, transactions: Vec<TransactionRecord>) -> DbResult<()> {
        for tx in transactions {
            let key = keys::row_key(tx.chain_id, tx.block_number, tx.transaction_index);
            self.transactions.insert(key, encode(&tx)?)?;
        }
        Ok(())
    }

    pub(crate) fn insert_transaction_receipts(
        &self,
        receipts: Vec<ReceiptRecord>,
    ) -> DbResult<()> {
        for receipt in receipts {
            let key = keys::row_key(
                receipt.chain_id,
                receipt.block_number,
                receipt.transaction_index,
            );
            self.receipts.insert(key, encode(&receipt)?)?;
        }
        Ok(())
    }

    pub(crate) fn insert_traces(&self, traces: Vec<TraceRecord>) -> DbResult<()> {
        for trace in traces {
            let key = keys::trace_key(
                trace.chain_id,
                trace.block_number,
                trace.transaction_index,
                trace.trace_index,
            );
            self.traces.insert(key, encode(&trace)?)?;
        }
        Ok(())
    }

    pub(crate) fn insert_factory_intervals(
        &self,
        factory: &LogFactory,
        interval: BlockInterval,
    ) -> DbResult<()> {
        let _guard = self.write_lock.lock();

        let id = factory.id();
        let mut row = match self.intervals.get(id.as_bytes())? {
            Some(bytes) => decode::<IntervalRow>(tree_names::INTERVALS, &bytes)?,
            None => IntervalRow {
                chain_id: factory.chain_id,
                blocks: Vec::new(),
            },
        };
        row.blocks = union(&row.blocks, &[interval]);
        self.intervals.insert(id.as_bytes(), encode(&row)?)?;
        Ok(())
    }

    pub(crate) fn get_factory_intervals(
        &self,
        factory: &LogFactory,
    ) -> DbResult<Vec<BlockInterval>> {
        match self.intervals.get(factory.id().as_bytes())? {
            Some(bytes) => Ok(decode::<IntervalRow>(tree_names::INTERVALS, &bytes)?.blocks),
            None => Ok(Vec::new()),
        }
    }

    // factory children

    pub(crate) fn insert_child_addresses(
        &self,
        factory: LogFactory,
        chain_id: u64,
        child_addresses: ChildAddresses,
    ) -> DbResult<()> {
        let _guard = self.write_lock.lock();

        let factory_id = factory.id();
        self.factories
            .insert(factory_id.as_bytes(), encode(&factory)?)?;

        for (address, block_number) in child_addresses {
            let key = keys::factory_address_key(chain_id, &factory_id, &address);
            let first_seen = match self.factory_addresses.get(&key)? {
                // on conflict the minimum first-seen block wins
                Some(bytes) => decode::<u64>(tree_names::FACTORY_ADDRESSES, &bytes)?
                    .min(block_number),
                None => block_number,
            };
            self.factory_addresses.insert(key, encode(&first_seen)?)?;
        }
        Ok(())
    }

    pub(crate) fn get_child_addresses(&self, factory: &LogFactory) -> DbResult<ChildAddresses> {
        let prefix = keys::factory_prefix(factory.chain_id, &factory.id());
        let mut out = ChildAddresses::new();
        for item in self.factory_addresses.scan_prefix(&prefix) {
            let (key, value) = item?;
            let address = keys::factory_key_address(&key).ok_or(DbError::CorruptKey {
                tree: tree_names::FACTORY_ADDRESSES,
            })?;
            out.insert(
                address,
                decode::<u64>(tree_names::FACTORY_ADDRESSES, &value)?,
            );
        }
        Ok(out)
    }

    // rpc response cache

    pub(crate) fn insert_rpc_request_results(
        &self,
        chain_id: u64,
        entries: Vec<RpcCacheEntry>,
    ) -> DbResult<()> {
        for entry in entries {
            let hash = request_hash(&entry.request);
            self.rpc_cache
                .insert(keys::rpc_cache_key(chain_id, hash), encode(&entry)?)?;
            if let Some(block_number) = entry.block_number {
                self.rpc_cache_by_block.insert(
                    keys::rpc_cache_block_key(chain_id, block_number, hash),
                    Vec::<u8>::new(),
                )?;
            }
        }
        Ok(())
    }

    pub(crate) fn get_rpc_request_results(
        &self,
        chain_id: u64,
        requests: Vec<String>,
    ) -> DbResult<Vec<Option<String>>> {
        requests
            .into_iter()
            .map(|request| {
                let hash = request_hash(&request);
                match self.rpc_cache.get(keys::rpc_cache_key(chain_id, hash))? {
                    Some(bytes) => Ok(Some(
                        decode::<RpcCacheEntry>(tree_names::RPC_CACHE, &bytes)?.result,
                    )),
                    None => Ok(None),
                }
            })
            .collect()
    }

    pub(crate) fn prune_rpc_request_results(
        &self,
        chain_id: u64,
        blocks: Vec<u64>,
    ) -> DbResult<()> {
        for block_number in blocks {
            let prefix = keys::rpc_cache_block_key(chain_id, block_number, [0; 16]);
            for item in self.rpc_cache_by_block.scan_prefix(&prefix[..16]) {
                let (key, _) = item?;
                if key.len() == 32 {
                    let mut hash = [0u8; 16];
                    hash.copy_from_slice(&key[16..]);
                    self.rpc_cache.remove(keys::rpc_cache_key(chain_id, hash))?;
                }
                self.rpc_cache_by_block.remove(key)?;
            }
        }
        Ok(())
    }

    // pruning

    pub(crate) fn prune_blocks_above(&self, chain_id: u64, block_number: u64) -> DbResult<()> {
        let _guard = self.write_lock.lock();

        let Some(from) = block_number.checked_add(1) else {
            return Ok(());
        };

        // blocks + hash index
        let range = keys::block_key(chain_id, from)..=keys::block_key(chain_id, u64::MAX);
        for item in self.blocks.range(range) {
            let (key, value) = item?;
            let block = decode::<BlockRecord>(tree_names::BLOCKS, &value)?;
            self.blocks_by_hash
                .remove(keys::block_hash_key(chain_id, &block.hash))?;
            self.blocks.remove(key)?;
        }

        for tree in [&self.logs, &self.transactions, &self.receipts] {
            let range =
                keys::row_key(chain_id, from, 0)..=keys::row_key(chain_id, u64::MAX, u64::MAX);
            for item in tree.range(range) {
                let (key, _) = item?;
                tree.remove(key)?;
            }
        }

        let range = keys::trace_key(chain_id, from, 0, 0)
            ..=keys::trace_key(chain_id, u64::MAX, u64::MAX, u64::MAX);
        for item in self.traces.range(range) {
            let (key, _) = item?;
            self.traces.remove(key)?;
        }

        // factory children discovered above the ancestor
        for item in self.factory_addresses.scan_prefix(keys::chain_prefix(chain_id)) {
            let (key, value) = item?;
            if decode::<u64>(tree_names::FACTORY_ADDRESSES, &value)? > block_number {
                self.factory_addresses.remove(key)?;
            }
        }

        // rpc cache entries tied to pruned blocks
        let range = keys::rpc_cache_block_key(chain_id, from, [0; 16])
            ..=keys::rpc_cache_block_key(chain_id, u64::MAX, [0xff; 16]);
        for item in self.rpc_cache_by_block.range(range) {
            let (key, _) = item?;
            if key.len() == 32 {
                let mut hash = [0u8; 16];
                hash.copy_from_slice(&key[16..]);
                self.rpc_cache.remove(keys::rpc_cache_key(chain_id, hash))?;
            }
            self.rpc_cache_by_block.remove(key)?;
        }

        Ok(())
    }

    pub(crate) fn prune_by_chain(&self, chain_id: u64) -> DbResult<()> {
        let _guard = self.write_lock.lock();

        // ledger rows first; orphan data rows are harmless, stale ledger
        // rows are not
        for item in self.intervals.iter() {
            let (key, value) = item?;
            if decode::<IntervalRow>(tree_names::INTERVALS, &value)?.chain_id == chain_id {
                self.intervals.remove(key)?;
            }
        }
        for item in self.factories.iter() {
            let (key, value) = item?;
            if decode::<LogFactory>(tree_names::FACTORIES, &value)?.chain_id == chain_id {
                self.factories.remove(key)?;
            }
        }

        let prefix = keys::chain_prefix(chain_id);
        for tree in [
            &self.blocks,
            &self.blocks_by_hash,
            &self.logs,
            &self.transactions,
            &self.receipts,
            &self.traces,
            &self.factory_addresses,
            &self.rpc_cache,
            &self.rpc_cache_by_block,
            &self.checkpoints,
        ] {
            for item in tree.scan_prefix(prefix) {
                let (key, _) = item?;
                tree.remove(key)?;
            }
        }
        Ok(())
    }

    // crash recovery

    pub(crate) fn get_safe_crash_recovery_block(
        &self,
        chain_id: u64,
        timestamp: u64,
    ) -> DbResult<Option<BlockRecord>> {
        let range = keys::block_key(chain_id, 0)..=keys::block_key(chain_id, u64::MAX);
        for item in self.blocks.range(range).rev() {
            let (_, value) = item?;
            let block = decode::<BlockRecord>(tree_names::BLOCKS, &value)?;
            if block.timestamp < timestamp {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    pub(crate) fn get_checkpoint_row(&self, chain_id: u64) -> DbResult<Option<CheckpointRow>> {
        match self.checkpoints.get(keys::chain_prefix(chain_id))? {
            Some(bytes) => Ok(Some(decode(tree_names::CHECKPOINTS, &bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn upsert_checkpoint_row(&self, row: CheckpointRow) -> DbResult<()> {
        self.checkpoints
            .insert(keys::chain_prefix(row.chain_id), encode(&row)?)?;
        Ok(())
    }

    // event-range scan

    pub(crate) fn get_event_block_data(
        &self,
        request: EventBlockRequest,
    ) -> DbResult<EventBlockPage> {
        if request.from_block > request.to_block || request.filters.is_empty() {
            return Ok(EventBlockPage::default());
        }

        let scan = self.scan_event_rows(&request, request.from_block, request.to_block, true)?;

        let cursor = match scan.supremum {
            None => request.to_block,
            Some(supremum) if supremum > request.from_block => supremum - 1,
            // the limit is too small for even one full block; re-fetch the
            // first block exhaustively to guarantee forward progress
            Some(_) => {
                let retry =
                    self.scan_event_rows(&request, request.from_block, request.from_block, false)?;
                return self.finish_page(&request, retry.rows, request.from_block);
            }
        };

        self.finish_page(&request, scan.rows, cursor)
    }

    fn finish_page(
        &self,
        request: &EventBlockRequest,
        mut rows: BTreeMap<u64, BlockEventRows>,
        cursor: u64,
    ) -> DbResult<EventBlockPage> {
        rows.retain(|number, _| *number <= cursor);

        // block rows for every block that carries events, plus pure
        // block-interval matches
        let mut needed: BTreeSet<u64> = rows.keys().copied().collect();
        for (_, filter) in &request.filters {
            if let Filter::Block(block_filter) = filter {
                needed.extend(block_filter_matches(
                    block_filter,
                    request.from_block,
                    cursor,
                ));
            }
        }

        for number in needed {
            let Some(bytes) = self.blocks.get(keys::block_key(request.chain_id, number))? else {
                return Err(DbError::corrupt(
                    tree_names::BLOCKS,
                    format!("ledgered block {number} has no stored row"),
                ));
            };
            rows.entry(number).or_default().block =
                Some(decode::<BlockRecord>(tree_names::BLOCKS, &bytes)?);
        }

        Ok(EventBlockPage {
            blocks: rows.into_iter().collect(),
            cursor: Some(cursor),
        })
    }

    fn scan_event_rows(
        &self,
        request: &EventBlockRequest,
        from: u64,
        to: u64,
        enforce_limit: bool,
    ) -> DbResult<EventRowScan> {
        let chain_id = request.chain_id;
        let limit = if enforce_limit {
            request.limit.max(1)
        } else {
            usize::MAX
        };

        let mut log_filters: Vec<&LogFilter> = Vec::new();
        let mut trace_filters: Vec<&TraceFilter> = Vec::new();
        let mut transfer_filters: Vec<&TransferFilter> = Vec::new();
        let mut transaction_filters: Vec<&TransactionFilter> = Vec::new();
        let mut want_receipts = false;
        for (_, filter) in &request.filters {
            want_receipts |= filter.requires_receipts();
            match filter {
                Filter::Log(f) => log_filters.push(f),
                Filter::Trace(f) => trace_filters.push(f),
                Filter::Transfer(f) => transfer_filters.push(f),
                Filter::Transaction(f) => transaction_filters.push(f),
                Filter::Block(_) => {}
            }
        }

        // child sets of every referenced factory
        let mut children: HashMap<String, ChildAddresses> = HashMap::new();
        for (_, filter) in &request.filters {
            for factory in filter.factories() {
                let id = factory.id();
                if !children.contains_key(&id) {
                    children.insert(id, self.get_child_addresses(factory)?);
                }
            }
        }
        let mut rows: BTreeMap<u64, BlockEventRows> = BTreeMap::new();
        let mut supremum: Option<u64> = None;
        // transactions referenced by matched logs/traces
        let mut referenced: BTreeSet<(u64, u64)> = BTreeSet::new();

        if !log_filters.is_empty() {
            let mut count = 0usize;
            let range = keys::row_key(chain_id, from, 0)..=keys::row_key(chain_id, to, u64::MAX);
            for item in self.logs.range(range) {
                let (_, value) = item?;
                let log = decode::<LogRecord>(tree_names::LOGS, &value)?;
                let rpc_log = log.to_rpc();
                let matched = log_filters
                    .iter()
                    .any(|f| f.matches(&rpc_log, child_of(&children, f.address.factory())));
                if !matched {
                    continue;
                }
                if count == limit {
                    note_hit(log.block_number, &mut supremum);
                    break;
                }

                count += 1;
                referenced.insert((log.block_number, log.transaction_index));
                rows.entry(log.block_number).or_default().logs.push(log);
            }
        }

        if !trace_filters.is_empty() || !transfer_filters.is_empty() {
            let mut count = 0usize;
            let range = keys::trace_key(chain_id, from, 0, 0)
                ..=keys::trace_key(chain_id, to, u64::MAX, u64::MAX);
            for item in self.traces.range(range) {
                let (_, value) = item?;
                let trace = decode::<TraceRecord>(tree_names::TRACES, &value)?;
                let matched = trace_filters.iter().any(|f| {
                    f.matches(
                        &trace,
                        child_of(&children, f.from_address.factory()),
                        child_of(&children, f.to_address.factory()),
                    )
                }) || transfer_filters.iter().any(|f| {
                    f.matches(
                        &trace,
                        child_of(&children, f.from_address.factory()),
                        child_of(&children, f.to_address.factory()),
                    )
                });
                if !matched {
                    continue;
                }
                if count == limit {
                    note_hit(trace.block_number, &mut supremum);
                    break;
                }
                count += 1;
                referenced.insert((trace.block_number, trace.transaction_index));
                rows.entry(trace.block_number).or_default().traces.push(trace);
            }
        }

        if !transaction_filters.is_empty() || !referenced.is_empty() {
            let mut count = 0usize;
            let range = keys::row_key(chain_id, from, 0)..=keys::row_key(chain_id, to, u64::MAX);
            for item in self.transactions.range(range) {
                let (_, value) = item?;
                let tx = decode::<TransactionRecord>(tree_names::TRANSACTIONS, &value)?;
                let matched = referenced.contains(&(tx.block_number, tx.transaction_index))
                    || transaction_filters.iter().any(|f| f.matches_weak(&tx));
                if !matched {
                    continue;
                }
                if count == limit {
                    note_hit(tx.block_number, &mut supremum);
                    break;
                }
                count += 1;
                rows.entry(tx.block_number).or_default().transactions.push(tx);
            }
        }

        if want_receipts {
            let mut count = 0usize;
            let range = keys::row_key(chain_id, from, 0)..=keys::row_key(chain_id, to, u64::MAX);
            for item in self.receipts.range(range) {
                let (_, value) = item?;
                let receipt = decode::<ReceiptRecord>(tree_names::RECEIPTS, &value)?;
                let wanted = rows
                    .get(&receipt.block_number)
                    .is_some_and(|block_rows| {
                        block_rows
                            .transactions
                            .iter()
                            .any(|tx| tx.transaction_index == receipt.transaction_index)
                    });
                if !wanted {
                    continue;
                }
                if count == limit {
                    note_hit(receipt.block_number, &mut supremum);
                    break;
                }
                count += 1;
                rows.entry(receipt.block_number).or_default().receipts.push(receipt);
            }
        }

        Ok(EventRowScan { rows, supremum })
    }
}

struct EventRowScan {
    rows: BTreeMap<u64, BlockEventRows>,
    /// Lowest per-table final block among tables that hit the row limit.
    supremum: Option<u64>,
}

fn note_hit(last_block: u64, supremum: &mut Option<u64>) {
    *supremum = Some(match supremum {
        Some(s) => (*s).min(last_block),
        None => last_block,
    });
}

fn child_of<'a>(
    children: &'a HashMap<String, ChildAddresses>,
    factory: Option<&LogFactory>,
) -> Option<&'a ChildAddresses> {
    factory.and_then(|f| children.get(&f.id()))
}

/// Block numbers in `[from, to]` matching a block-interval filter.
fn block_filter_matches(filter: &BlockFilter, from: u64, to: u64) -> Vec<u64> {
    if filter.interval == 0 {
        return Vec::new();
    }
    let start = from.max(filter.from_block);
    let end = filter.to_block.map_or(to, |t| t.min(to));
    if start > end {
        return Vec::new();
    }

    let rem = filter.offset % filter.interval;
    let first = start + (rem + filter.interval - start % filter.interval) % filter.interval;
    (first..=end).step_by(filter.interval as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_filter_matches() {
        let filter = BlockFilter {
            chain_id: 1,
            interval: 10,
            offset: 3,
            from_block: 0,
            to_block: None,
        };
        assert_eq!(block_filter_matches(&filter, 0, 30), vec![3, 13, 23]);
        assert_eq!(block_filter_matches(&filter, 13, 23), vec![13, 23]);
        assert_eq!(block_filter_matches(&filter, 14, 22), Vec::<u64>::new());
        assert_eq!(
            block_filter_matches(
                &BlockFilter {
                    interval: 1,
                    offset: 0,
                    ..filter
                },
                5,
                7
            ),
            vec![5, 6, 7]
        );
    }
}
