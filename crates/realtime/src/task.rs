//! Realtime sync loop: head polling, reconciliation, reorg handling, and
//! finality advancement.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use eventide_common::{
    build_events, logs_at_hash_checked,
    types::{
        filter::{Filter, LogFilter},
        records::{
            flatten_traces, BlockRecord, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord,
        },
        rpc,
    },
    BlockEventData, BlockTag, EthClient, EthClientError, LightBlock, RealtimeEvent, SyncStore,
};
use eventide_config::defaults::{HEAD_FAILURE_BUDGET_SECS, RETRY_SCHEDULE_SECS};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    ctx::RealtimeCtx,
    error::{RealtimeError, Result},
    state::{RealtimeState, ReceiptsMode},
};

/// Runs the realtime syncer until shutdown or a fatal condition.
pub(crate) async fn realtime_sync_task<TClient, TStore>(
    mut state: RealtimeState,
    ctx: RealtimeCtx<TClient, TStore>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    match run_poll_loop(&mut state, &ctx).await {
        Err(error) if error.is_fatal() && !matches!(error, RealtimeError::Shutdown) => {
            error!(%error, chain = %ctx.chain.name(), "realtime sync fatal");
            let _ = ctx
                .event_tx
                .send(RealtimeEvent::Fatal {
                    chain_id: ctx.chain.id(),
                    reason: error.to_string(),
                })
                .await;
            Err(error)
        }
        other => other,
    }
}

async fn run_poll_loop<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let mut shutdown = ctx.shutdown_rx.clone();
    let polling_interval = Duration::from_millis(ctx.chain.polling_interval_ms());
    let mut head_failures_since: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Err(RealtimeError::Shutdown);
                }
            }
            _ = tokio::time::sleep(polling_interval) => {}
        }

        let head = match ctx.client.block_by_number(BlockTag::Latest, true).await {
            Ok(Some(block)) => {
                head_failures_since = None;
                block
            }
            Ok(None) => {
                warn!("latest block query returned nothing");
                continue;
            }
            Err(error) => {
                let since = *head_failures_since.get_or_insert_with(Instant::now);
                let elapsed = since.elapsed().as_secs();
                if elapsed > HEAD_FAILURE_BUDGET_SECS {
                    return Err(RealtimeError::HeadPollingExhausted {
                        elapsed_secs: elapsed,
                        source: error,
                    });
                }
                warn!(%error, %elapsed, "failed to fetch latest block");
                continue;
            }
        };

        reconcile_with_retries(state, ctx, head).await?;
    }
}

/// Retries recoverable reconciliation errors on the fixed backoff schedule,
/// escalating to fatal after the last slot.
async fn reconcile_with_retries<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    head: rpc::Block,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    for delay in RETRY_SCHEDULE_SECS {
        match reconcile(state, ctx, head.clone()).await {
            Ok(()) => return Ok(()),
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(%error, retry_in = delay, "reconciliation failed; backing off");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }
    }
    match reconcile(state, ctx, head).await {
        Ok(()) => Ok(()),
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => Err(RealtimeError::RetriesExhausted(Box::new(error))),
    }
}

/// Applies one observed head to the local chain.
async fn reconcile<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    head: rpc::Block,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let _guard = ctx.reconcile_lock.lock().await;

    let latest = *state.chain.latest();

    // case 1: already the tip
    if head.hash == latest.hash {
        return Ok(());
    }
    // an already-known block elsewhere on the chain is a stale poll
    if state.chain.find(&head.hash).is_some() {
        return Ok(());
    }

    if head.number == latest.number + 1 && head.parent_hash == latest.hash {
        // case 4: happy path
        return process_block(state, ctx, head).await;
    }

    if head.number > latest.number + 1 {
        // case 3: gap; fetch the missing span, capped
        let gap_end = (head.number - 1).min(latest.number + ctx.max_queued_blocks);
        debug!(
            from = latest.number + 1,
            to = gap_end,
            head = head.number,
            "filling gap to observed head"
        );
        for number in latest.number + 1..=gap_end {
            let block = ctx
                .client
                .block_by_number(BlockTag::Number(number), true)
                .await?
                .ok_or_else(|| {
                    EthClientError::InconsistentResponse(format!(
                        "gap block {number} not returned"
                    ))
                })?;
            apply_block(state, ctx, block).await?;
        }
        if gap_end == head.number - 1 {
            apply_block(state, ctx, head).await?;
        }
        return Ok(());
    }

    // cases 2 and 5: reorg
    handle_reorg(state, ctx, head).await
}

/// Extends the chain with a block, falling back to reorg handling when it
/// does not link.
async fn apply_block<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    block: rpc::Block,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let latest = *state.chain.latest();
    if block.number == latest.number + 1 && block.parent_hash == latest.hash {
        process_block(state, ctx, block).await
    } else {
        handle_reorg(state, ctx, block).await
    }
}

/// Finds the common ancestor of the remote chain, rolls local state back,
/// and re-applies the canonical blocks.
async fn handle_reorg<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    remote_head: rpc::Block,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let finalized_number = state.chain.finalized().number;

    // walk the remote chain backwards until it meets the local chain; no
    // local state is touched until the ancestor is known, so a failed walk
    // leaves everything intact
    let mut remote_chain: Vec<rpc::Block> = vec![remote_head];
    let ancestor = loop {
        let oldest = remote_chain.last().expect("walk starts non-empty");
        if let Some(ancestor) = state.chain.find(&oldest.parent_hash) {
            break *ancestor;
        }
        if oldest.number <= finalized_number {
            return Err(RealtimeError::DeepReorg { finalized_number });
        }
        let parent = ctx
            .client
            .block_by_hash(oldest.parent_hash, true)
            .await?
            .ok_or_else(|| {
                EthClientError::InconsistentResponse(format!(
                    "parent {} of reorged block {} not returned",
                    oldest.parent_hash, oldest.number
                ))
            })?;
        remote_chain.push(parent);
    };

    if ancestor.number < finalized_number {
        return Err(RealtimeError::DeepReorg { finalized_number });
    }

    let reorged_blocks = state
        .chain
        .pop_above(&ancestor.hash)
        .expect("ancestor was found on the local chain");

    warn!(
        chain = %ctx.chain.name(),
        ancestor = ancestor.number,
        depth = reorged_blocks.len(),
        "reorg detected; rolling back"
    );

    let pruned_numbers: Vec<u64> = reorged_blocks.iter().map(|b| b.number).collect();
    ctx.store
        .prune_blocks_above(ctx.chain.id(), ancestor.number)
        .await?;
    ctx.store
        .prune_rpc_request_results(ctx.chain.id(), pruned_numbers)
        .await?;
    state.rollback_children_above(ancestor.number);

    send_event(
        ctx,
        RealtimeEvent::Reorg {
            chain_id: ctx.chain.id(),
            common_ancestor: ancestor,
            reorged_blocks,
        },
    )
    .await?;

    for block in remote_chain.into_iter().rev() {
        process_block(state, ctx, block).await?;
    }
    Ok(())
}

/// Happy-path processing of one canonical block.
async fn process_block<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    block: rpc::Block,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let chain_id = ctx.chain.id();
    let light = LightBlock::from(&block);
    let block_record = BlockRecord::from_rpc(chain_id, &block);

    let log_filters: Vec<&LogFilter> = ctx
        .sources
        .iter()
        .filter_map(|(_, f)| match f {
            Filter::Log(log_filter) => Some(log_filter),
            _ => None,
        })
        .collect();
    let factories: Vec<_> = ctx
        .sources
        .iter()
        .flat_map(|(_, f)| f.factories())
        .collect();

    // 1. bloom pre-check gates the logs fetch
    let wants_logs = !log_filters.is_empty() || !factories.is_empty();
    let bloom_may_match = block.logs_bloom.is_zero()
        || log_filters.iter().any(|f| f.matches_bloom(&block.logs_bloom))
        || !factories.is_empty();
    let logs = if wants_logs && bloom_may_match {
        logs_at_hash_checked(&*ctx.client, block.hash).await?
    } else {
        Vec::new()
    };

    // 2. traces when trace/transfer sources are registered
    let wants_traces = ctx.sources.iter().any(|(_, f)| f.requires_traces());
    let trace_rows: Vec<TraceRecord> = if wants_traces {
        fetch_block_traces(&*ctx.client, chain_id, &block).await?
    } else {
        Vec::new()
    };

    // 3. weak filtering (factory knowledge not yet updated)
    let weak_logs: Vec<&rpc::Log> = logs
        .iter()
        .filter(|log| log_filters.iter().any(|f| f.matches_weak(log)))
        .collect();
    let weak_traces: Vec<&TraceRecord> = trace_rows
        .iter()
        .filter(|trace| {
            ctx.sources.iter().any(|(_, f)| match f {
                Filter::Trace(f) => f.matches_weak(trace),
                Filter::Transfer(f) => f.matches_weak(trace),
                _ => false,
            })
        })
        .collect();
    let transactions: Vec<TransactionRecord> = block
        .transactions
        .iter()
        .map(|tx| TransactionRecord::from_rpc(chain_id, block.timestamp, tx))
        .collect();
    let weak_transactions: Vec<&TransactionRecord> = transactions
        .iter()
        .filter(|tx| {
            weak_logs.iter().any(|l| l.transaction_index == tx.transaction_index)
                || weak_traces
                    .iter()
                    .any(|t| t.transaction_index == tx.transaction_index)
                || ctx.sources.iter().any(|(_, f)| match f {
                    Filter::Transaction(f) => f.matches_weak(tx),
                    _ => false,
                })
        })
        .collect();

    // 4. receipts, preferring the block-level call
    let wants_receipts = ctx.sources.iter().any(|(_, f)| f.requires_receipts());
    let receipts: Vec<ReceiptRecord> = if wants_receipts && !weak_transactions.is_empty() {
        fetch_receipts(state, ctx, &block, &weak_transactions).await?
    } else {
        Vec::new()
    };

    // 5. factory children discovered in this block
    let mut child_delta: HashMap<String, eventide_common::ChildAddresses> = HashMap::new();
    for factory in &factories {
        let id = factory.id();
        let discovered: Vec<_> = logs
            .iter()
            .filter(|log| factory.matches_log(log))
            .filter_map(|log| factory.child_address(log))
            .collect();
        let fresh = state.record_children(block.number, &id, discovered);
        if !fresh.is_empty() {
            child_delta
                .entry(id)
                .or_default()
                .extend(fresh.into_iter().map(|a| (a, block.number)));
        }
    }

    // 6. final filtering with factory knowledge
    let rows = eventide_common::BlockEventRows {
        block: Some(block_record.clone()),
        logs: logs
            .iter()
            .map(|log| LogRecord::from_rpc(chain_id, block.timestamp, log))
            .collect(),
        transactions: transactions.clone(),
        receipts: receipts.clone(),
        traces: trace_rows.clone(),
    };
    let events = build_events(&ctx.sources, &rows, &state.children);
    let matched_sources: Vec<usize> = {
        let mut seen: Vec<usize> = events.iter().map(|e| e.source_index).collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    };
    let has_matched_filter = !matched_sources.is_empty();

    // keep only matched rows in the store
    let final_logs: Vec<LogRecord> = events.iter().filter_map(|e| e.log.clone()).collect();
    let final_traces: Vec<TraceRecord> = events.iter().filter_map(|e| e.trace.clone()).collect();
    let final_transactions: Vec<TransactionRecord> = {
        let mut txs: Vec<TransactionRecord> =
            events.iter().filter_map(|e| e.transaction.clone()).collect();
        txs.sort_by_key(|tx| tx.transaction_index);
        txs.dedup_by_key(|tx| tx.transaction_index);
        txs
    };
    let final_receipts: Vec<ReceiptRecord> = {
        let mut rows: Vec<ReceiptRecord> = events
            .iter()
            .filter_map(|e| e.transaction_receipt.clone())
            .collect();
        rows.sort_by_key(|r| r.transaction_index);
        rows.dedup_by_key(|r| r.transaction_index);
        rows
    };

    // 7. extend the local chain, persist, emit, await the ack
    state.chain.push(light)?;

    ctx.store.insert_blocks(vec![block_record.clone()]).await?;
    ctx.store.insert_logs(final_logs.clone()).await?;
    ctx.store
        .insert_transactions(final_transactions.clone())
        .await?;
    ctx.store
        .insert_transaction_receipts(final_receipts.clone())
        .await?;
    ctx.store.insert_traces(final_traces.clone()).await?;

    let (ack_tx, ack_rx) = oneshot::channel();
    send_event(
        ctx,
        RealtimeEvent::Block {
            data: Box::new(BlockEventData {
                chain_id,
                block: block_record,
                logs: final_logs,
                transactions: final_transactions,
                receipts: final_receipts,
                traces: final_traces,
                events,
                child_addresses: child_delta,
                matched_sources,
                has_matched_filter,
            }),
            ack: ack_tx,
        },
    )
    .await?;
    match ack_rx.await {
        Ok(true) => {}
        Ok(false) | Err(_) => return Err(RealtimeError::ChannelClosed),
    }

    // 8. finality advancement
    advance_finality(state, ctx, block.number).await
}

async fn advance_finality<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    head_number: u64,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let finality_depth = ctx.chain.finality_block_count();
    let old_finalized = state.chain.finalized().number;
    if head_number < old_finalized + 2 * finality_depth {
        return Ok(());
    }
    let pending_finalized = head_number - finality_depth;

    state.chain.prune_to(pending_finalized)?;
    let finalized = *state.chain.finalized();

    // the ledger records the finalized span for every source; the syncer
    // observed every block in it and persisted the matched rows
    let chain_id = ctx.chain.id();
    let mut entries = Vec::new();
    for (_, filter) in &ctx.sources {
        let from = filter.from_block().max(old_finalized + 1);
        if from <= pending_finalized {
            entries.push((filter.clone(), (from, pending_finalized)));
        }
    }
    if !entries.is_empty() {
        ctx.store.insert_intervals(chain_id, entries).await?;
    }

    for (_, filter) in &ctx.sources {
        for factory in filter.factories() {
            let from = factory.from_block.max(old_finalized + 1);
            if from <= pending_finalized {
                ctx.store
                    .insert_factory_intervals(factory.clone(), (from, pending_finalized))
                    .await?;
            }
        }
    }

    // finalized children are owned by the store from here on
    let finalized_children = state.finalize_children(pending_finalized);
    for (factory_id, children) in finalized_children {
        let Some(factory) = ctx
            .sources
            .iter()
            .flat_map(|(_, f)| f.factories())
            .find(|f| f.id() == factory_id)
        else {
            continue;
        };
        ctx.store
            .insert_child_addresses(factory.clone(), chain_id, children)
            .await?;
    }

    info!(chain = %ctx.chain.name(), finalized = pending_finalized, "finality advanced");
    send_event(
        ctx,
        RealtimeEvent::Finalize {
            chain_id,
            finalized,
        },
    )
    .await
}

async fn fetch_receipts<TClient, TStore>(
    state: &mut RealtimeState,
    ctx: &RealtimeCtx<TClient, TStore>,
    block: &rpc::Block,
    required: &[&TransactionRecord],
) -> Result<Vec<ReceiptRecord>>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let chain_id = ctx.chain.id();

    if state.receipts_mode == ReceiptsMode::Block {
        match ctx.client.block_receipts(block.hash).await {
            Ok(receipts) => {
                return Ok(receipts
                    .iter()
                    .map(|r| ReceiptRecord::from_rpc(chain_id, r))
                    .collect())
            }
            Err(error) => {
                // latch to per-transaction fetches for the syncer lifetime
                warn!(%error, "eth_getBlockReceipts failed; latching to per-transaction receipts");
                state.receipts_mode = ReceiptsMode::PerTransaction;
            }
        }
    }

    let mut receipts = Vec::with_capacity(required.len());
    for transaction in required {
        let receipt = ctx
            .client
            .transaction_receipt(transaction.hash)
            .await?
            .ok_or_else(|| {
                EthClientError::InconsistentResponse(format!(
                    "receipt for transaction {} missing",
                    transaction.hash
                ))
            })?;
        receipts.push(ReceiptRecord::from_rpc(chain_id, &receipt));
    }
    Ok(receipts)
}

async fn fetch_block_traces<TClient: EthClient>(
    client: &TClient,
    chain_id: u64,
    block: &rpc::Block,
) -> Result<Vec<TraceRecord>> {
    let results = client.trace_block_by_hash(block.hash).await?;
    let mut rows = Vec::new();
    for (position, result) in results.iter().enumerate() {
        let transaction = match result.tx_hash {
            Some(hash) => block.transactions.iter().find(|tx| tx.hash == hash),
            None => block.transactions.get(position),
        };
        let Some(transaction) = transaction else {
            return Err(EthClientError::InconsistentResponse(format!(
                "trace {position} of block {} references no known transaction",
                block.number
            ))
            .into());
        };
        rows.extend(flatten_traces(
            chain_id,
            block.timestamp,
            block.number,
            transaction.hash,
            transaction.transaction_index,
            &result.result,
        ));
    }
    Ok(rows)
}

async fn send_event<TClient, TStore>(
    ctx: &RealtimeCtx<TClient, TStore>,
    event: RealtimeEvent,
) -> Result<()> {
    ctx.event_tx
        .send(event)
        .await
        .map_err(|_| RealtimeError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Address, BloomInput, B256, U256};
    use eventide_common::{
        types::filter::{AddressCriteria, TopicCriteria},
        MockEthClient, MockSyncStore,
    };
    use tokio::sync::{mpsc, watch, Mutex};

    use super::*;

    const FINALIZED: u64 = 16369955;

    fn block_hash(number: u64) -> B256 {
        B256::with_last_byte(number as u8)
    }

    fn make_rpc_block(number: u64, hash: B256, parent_hash: B256) -> rpc::Block {
        rpc::Block {
            hash,
            parent_hash,
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

    fn make_light(number: u64) -> LightBlock {
        LightBlock {
            hash: block_hash(number),
            parent_hash: block_hash(number.wrapping_sub(1)),
            number,
            timestamp: number * 12,
        }
    }

    fn any_log_source() -> (usize, Filter) {
        (
            0,
            Filter::Log(LogFilter {
                chain_id: 1,
                address: AddressCriteria::Any,
                topics: [
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                ],
                from_block: 0,
                to_block: None,
                include_receipts: false,
            }),
        )
    }

    fn permissive_store() -> MockSyncStore {
        let mut store = MockSyncStore::new();
        store.expect_insert_blocks().returning(|_| Ok(()));
        store.expect_insert_logs().returning(|_| Ok(()));
        store.expect_insert_transactions().returning(|_| Ok(()));
        store
            .expect_insert_transaction_receipts()
            .returning(|_| Ok(()));
        store.expect_insert_traces().returning(|_| Ok(()));
        store.expect_insert_intervals().returning(|_, _| Ok(()));
        store
            .expect_insert_factory_intervals()
            .returning(|_, _| Ok(()));
        store
            .expect_insert_child_addresses()
            .returning(|_, _, _| Ok(()));
        store.expect_prune_blocks_above().returning(|_, _| Ok(()));
        store
            .expect_prune_rpc_request_results()
            .returning(|_, _| Ok(()));
        store
    }

    fn make_ctx(
        client: MockEthClient,
        store: MockSyncStore,
        sources: Vec<(usize, Filter)>,
        finality: u64,
    ) -> (
        RealtimeCtx<MockEthClient, MockSyncStore>,
        mpsc::Receiver<RealtimeEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // the poll loop is not driven in these tests
        drop(shutdown_tx);
        let ctx = RealtimeCtx {
            client: Arc::new(client),
            store: Arc::new(store),
            chain: Arc::new(eventide_config::ChainParams::new(
                "mainnet",
                1,
                finality,
                "http://localhost:8545",
            )),
            sources,
            event_tx,
            shutdown_rx,
            reconcile_lock: Mutex::new(()),
            max_queued_blocks: 25,
        };
        (ctx, event_rx)
    }

    /// Consumes events, acking blocks, until the channel drains.
    async fn consume(mut event_rx: mpsc::Receiver<RealtimeEvent>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(event) = event_rx.recv().await {
            match event {
                RealtimeEvent::Block { data, ack } => {
                    seen.push(format!("block:{}", data.block.number));
                    let _ = ack.send(true);
                }
                RealtimeEvent::Reorg {
                    common_ancestor,
                    reorged_blocks,
                    ..
                } => {
                    seen.push(format!(
                        "reorg:{}:{}",
                        common_ancestor.number,
                        reorged_blocks
                            .iter()
                            .map(|b| b.number.to_string())
                            .collect::<Vec<_>>()
                            .join("+")
                    ));
                }
                RealtimeEvent::Finalize { finalized, .. } => {
                    seen.push(format!("finalize:{}", finalized.number));
                }
                RealtimeEvent::Fatal { reason, .. } => seen.push(format!("fatal:{reason}")),
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_happy_path_extends_chain() {
        let mut client = MockEthClient::new();
        // empty bloom forces the logs fetch
        client
            .expect_logs()
            .times(1)
            .returning(|_| Ok(vec![]));

        let (ctx, event_rx) = make_ctx(client, permissive_store(), vec![any_log_source()], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());

        let head = make_rpc_block(
            FINALIZED + 1,
            block_hash(FINALIZED + 1),
            block_hash(FINALIZED),
        );
        let (result, seen) = tokio::join!(
            async {
                let result = reconcile(&mut state, &ctx, head).await;
                drop(ctx);
                result
            },
            consume(event_rx)
        );

        result.unwrap();
        assert_eq!(seen, vec![format!("block:{}", FINALIZED + 1)]);
        assert_eq!(state.chain.latest().number, FINALIZED + 1);
    }

    #[tokio::test]
    async fn test_same_head_is_noop() {
        let client = MockEthClient::new();
        let (ctx, _event_rx) = make_ctx(client, MockSyncStore::new(), vec![any_log_source()], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());

        // identical hash at the same height
        let head = make_rpc_block(FINALIZED, block_hash(FINALIZED), block_hash(FINALIZED - 1));
        reconcile(&mut state, &ctx, head).await.unwrap();
        assert_eq!(state.chain.latest().number, FINALIZED);
    }

    #[tokio::test]
    async fn test_known_non_tip_head_is_noop() {
        // a stale poll resurfaces a block the local chain already holds
        // below the tip; no expectations on the mocks, so any RPC or store
        // call (a spurious reorg walk) panics
        let client = MockEthClient::new();
        let (ctx, _event_rx) = make_ctx(client, MockSyncStore::new(), vec![any_log_source()], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());
        state.chain.push(make_light(FINALIZED + 1)).unwrap();
        state.chain.push(make_light(FINALIZED + 2)).unwrap();

        let head = make_rpc_block(
            FINALIZED + 1,
            block_hash(FINALIZED + 1),
            block_hash(FINALIZED),
        );
        reconcile(&mut state, &ctx, head).await.unwrap();

        // chain untouched, no reorg emitted
        assert_eq!(state.chain.latest().number, FINALIZED + 2);
        assert_eq!(state.chain.unfinalized_len(), 2);
    }

    #[tokio::test]
    async fn test_reorg_replaces_tip() {
        // local: 16369955 (finalized) -> 16369956
        // remote: 16369956' -> 16369957 (parent hashes unknown locally)
        let fork_hash_56 = B256::repeat_byte(0xe1);
        let fork_hash_57 = B256::repeat_byte(0xe2);

        let mut client = MockEthClient::new();
        let fork_block_56 = make_rpc_block(FINALIZED + 1, fork_hash_56, block_hash(FINALIZED));
        client
            .expect_block_by_hash()
            .times(1)
            .withf(move |hash, _| *hash == fork_hash_56)
            .returning(move |_, _| Ok(Some(fork_block_56.clone())));
        client.expect_logs().times(2).returning(|_| Ok(vec![]));

        let (ctx, event_rx) = make_ctx(client, permissive_store(), vec![any_log_source()], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());
        state.chain.push(make_light(FINALIZED + 1)).unwrap();

        let head = make_rpc_block(FINALIZED + 2, fork_hash_57, fork_hash_56);
        let (result, seen) = tokio::join!(
            async {
                let result = reconcile(&mut state, &ctx, head).await;
                drop(ctx);
                result
            },
            consume(event_rx)
        );

        result.unwrap();
        assert_eq!(
            seen,
            vec![
                format!("reorg:{FINALIZED}:{}", FINALIZED + 1),
                format!("block:{}", FINALIZED + 1),
                format!("block:{}", FINALIZED + 2),
            ]
        );
        assert_eq!(state.chain.latest().number, FINALIZED + 2);
        assert_eq!(state.chain.latest().hash, fork_hash_57);
    }

    #[tokio::test]
    async fn test_deep_reorg_is_fatal_and_restores_chain() {
        // the remote fork does not meet the local chain before finality
        let fork_hash = B256::repeat_byte(0xd1);

        let client = MockEthClient::new();
        let (ctx, _event_rx) = make_ctx(client, MockSyncStore::new(), vec![any_log_source()], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());
        state.chain.push(make_light(FINALIZED + 1)).unwrap();

        // remote block at the finalized height with an unknown parent: the
        // walk would have to cross finality
        let head = make_rpc_block(FINALIZED, fork_hash, B256::repeat_byte(0xd0));
        let error = reconcile(&mut state, &ctx, head).await.unwrap_err();

        assert!(matches!(error, RealtimeError::DeepReorg { .. }));
        assert!(error.is_fatal());
        // local chain untouched
        assert_eq!(state.chain.latest().number, FINALIZED + 1);
        assert_eq!(state.chain.unfinalized_len(), 1);
    }

    #[tokio::test]
    async fn test_bloom_mismatch_skips_logs_fetch() {
        let mut bloom = alloy_primitives::Bloom::default();
        bloom.accrue(BloomInput::Raw(Address::repeat_byte(0x99).as_slice()));

        // a filter on a different address cannot match this bloom; no
        // expectation on logs() means the mock panics if it is called
        let source = (
            0,
            Filter::Log(LogFilter {
                chain_id: 1,
                address: AddressCriteria::One(Address::repeat_byte(0x11)),
                topics: [
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                ],
                from_block: 0,
                to_block: None,
                include_receipts: false,
            }),
        );

        let client = MockEthClient::new();
        let (ctx, event_rx) = make_ctx(client, permissive_store(), vec![source], 10);
        let mut state = RealtimeState::new(make_light(FINALIZED), HashMap::new());

        let mut head = make_rpc_block(
            FINALIZED + 1,
            block_hash(FINALIZED + 1),
            block_hash(FINALIZED),
        );
        head.logs_bloom = bloom;

        let (result, seen) = tokio::join!(
            async {
                let result = reconcile(&mut state, &ctx, head).await;
                drop(ctx);
                result
            },
            consume(event_rx)
        );
        result.unwrap();
        assert_eq!(seen, vec![format!("block:{}", FINALIZED + 1)]);
    }

    #[tokio::test]
    async fn test_finality_advances_after_double_depth() {
        let mut client = MockEthClient::new();
        client.expect_logs().returning(|_| Ok(vec![]));

        // finality depth 1: head 102 >= 100 + 2 finalizes 101
        let (ctx, event_rx) = make_ctx(client, permissive_store(), vec![any_log_source()], 1);
        let mut state = RealtimeState::new(
            LightBlock {
                hash: block_hash(100),
                parent_hash: block_hash(99),
                number: 100,
                timestamp: 1200,
            },
            HashMap::new(),
        );

        let (result, seen) = tokio::join!(
            async {
                reconcile(
                    &mut state,
                    &ctx,
                    make_rpc_block(101, block_hash(101), block_hash(100)),
                )
                .await?;
                let result = reconcile(
                    &mut state,
                    &ctx,
                    make_rpc_block(102, block_hash(102), block_hash(101)),
                )
                .await;
                drop(ctx);
                result
            },
            consume(event_rx)
        );

        result.unwrap();
        assert_eq!(
            seen,
            vec![
                "block:101".to_owned(),
                "block:102".to_owned(),
                "finalize:101".to_owned(),
            ]
        );
        assert_eq!(state.chain.finalized().number, 101);
    }
}
