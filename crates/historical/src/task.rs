//! Historical sync orchestrator: a bounded worker pool over the task queue,
//! feeding completions into the seal state machine.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy_primitives::B256;
use eventide_common::{
    types::{
        filter::{ChildAddresses, Filter, LogFactory, TopicCriteria},
        records::{
            flatten_traces, BlockRecord, LogRecord, ReceiptRecord, TraceRecord, TransactionRecord,
        },
        rpc,
    },
    block_by_number_checked, AddressCriteria, EthClient, EthClientError, LogQuery, SyncStore,
};
use eventide_config::defaults::RETRY_SCHEDULE_SECS;
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    ctx::HistoricalCtx,
    error::{HistoricalError, Result},
    queue::{Task, TaskQueue},
    split::{split_ranges, SplitOutcome},
    state::{HistoricalState, SealKind, SealWork},
};

enum TaskOutcome {
    LogDone {
        source_index: usize,
        from_block: u64,
        to_block: u64,
        logs: Vec<rpc::Log>,
    },
    FactoryDone {
        factory_id: String,
        from_block: u64,
        to_block: u64,
    },
    ChildDone {
        source_index: usize,
        from_block: u64,
        to_block: u64,
        logs: Vec<rpc::Log>,
    },
    BlockDone {
        block: rpc::Block,
    },
    Requeue {
        task: Task,
        attempts: u32,
    },
    Split {
        tasks: Vec<Task>,
    },
    Failed {
        error: HistoricalError,
    },
}

/// Runs the backfill to completion.
pub(crate) async fn historical_sync_task<TClient, TStore>(
    mut state: HistoricalState,
    mut queue: TaskQueue,
    ctx: HistoricalCtx<TClient, TStore>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let chain_name = ctx.chain.name().to_owned();
    let mut shutdown = ctx.shutdown_rx.clone();
    let mut in_flight: FuturesUnordered<BoxFuture<'static, TaskOutcome>> =
        FuturesUnordered::new();

    ctx.notify_progress(state.progress());
    ctx.notify_sealed(state.emit_cursor());

    loop {
        for task in state.eligible_block_tasks() {
            queue.push(task);
        }
        while in_flight.len() < ctx.max_concurrency {
            let Some((task, attempts)) = queue.pop() else {
                break;
            };
            in_flight.push(spawn_task(&state, task, attempts, &ctx));
        }

        drain_seals(&mut state, &ctx).await?;
        ctx.notify_progress(state.progress());
        ctx.notify_sealed(state.emit_cursor());

        if in_flight.is_empty() && queue.is_empty() {
            if state.is_complete() {
                info!(chain = %chain_name, "historical sync complete");
                return Ok(());
            }
            // every fetch task finished yet some source is unsealed; the
            // remaining seals were drained above, so this is a planner bug
            error!(chain = %chain_name, "historical sync stalled before completion");
            return Ok(());
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Err(HistoricalError::Shutdown);
                }
            }
            Some(outcome) = in_flight.next() => match outcome {
                TaskOutcome::LogDone { source_index, from_block, to_block, logs } => {
                    state.on_log_range_complete(source_index, from_block, to_block, logs);
                }
                TaskOutcome::ChildDone { source_index, from_block, to_block, logs } => {
                    state.on_child_range_complete(source_index, from_block, to_block, logs);
                }
                TaskOutcome::FactoryDone { factory_id, from_block, to_block } => {
                    for task in state.on_factory_range_complete(&factory_id, from_block, to_block) {
                        queue.push(task);
                    }
                }
                TaskOutcome::BlockDone { block } => state.on_block_fetched(block),
                TaskOutcome::Requeue { task, attempts } => queue.push_retry(task, attempts),
                TaskOutcome::Split { tasks } => {
                    for task in tasks {
                        queue.push(task);
                    }
                }
                TaskOutcome::Failed { error } => return Err(error),
            }
        }
    }
}

/// Materializes a queue entry into an owned future running one attempt.
fn spawn_task<TClient, TStore>(
    state: &HistoricalState,
    task: Task,
    attempts: u32,
    ctx: &HistoricalCtx<TClient, TStore>,
) -> BoxFuture<'static, TaskOutcome>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let client = ctx.client.clone();
    let store = ctx.store.clone();
    let chain_id = state.chain_id;
    let child_batch_size = ctx.child_batch_size;

    match task.clone() {
        Task::LogRange {
            source_index,
            from_block,
            to_block,
        } => {
            let query = log_query_for(&state.sources[source_index].filter, from_block, to_block);
            async move {
                match client.logs(query).await {
                    Ok(logs) => TaskOutcome::LogDone {
                        source_index,
                        from_block,
                        to_block,
                        logs,
                    },
                    Err(error) => recover(task, attempts, error).await,
                }
            }
            .boxed()
        }
        Task::FactoryRange {
            factory_id,
            from_block,
            to_block,
        } => {
            let factory = state.factories[&factory_id].factory.clone();
            let query = LogQuery::range(from_block, to_block)
                .with_addresses(factory.addresses.clone())
                .with_topic(0, vec![factory.event_selector]);
            async move {
                match run_factory_range(
                    &*client,
                    &*store,
                    chain_id,
                    &factory,
                    query,
                    from_block,
                    to_block,
                )
                .await
                {
                    Ok(()) => TaskOutcome::FactoryDone {
                        factory_id,
                        from_block,
                        to_block,
                    },
                    Err(HistoricalError::Client(error)) => recover(task, attempts, error).await,
                    Err(error) => TaskOutcome::Failed { error },
                }
            }
            .boxed()
        }
        Task::ChildRange {
            source_index,
            from_block,
            to_block,
        } => {
            let source = &state.sources[source_index];
            let factory = source
                .filter
                .factories()
                .first()
                .cloned()
                .cloned()
                .expect("child range task implies a factory source");
            let topics = match &source.filter {
                Filter::Log(f) => f.topics.clone(),
                _ => [
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                    TopicCriteria::Any,
                ],
            };
            async move {
                match run_child_range(
                    &*client,
                    &*store,
                    &factory,
                    &topics,
                    from_block,
                    to_block,
                    child_batch_size,
                )
                .await
                {
                    Ok(logs) => TaskOutcome::ChildDone {
                        source_index,
                        from_block,
                        to_block,
                        logs,
                    },
                    Err(HistoricalError::Client(error)) => recover(task, attempts, error).await,
                    Err(error) => TaskOutcome::Failed { error },
                }
            }
            .boxed()
        }
        Task::Block { block_number } => async move {
            match block_by_number_checked(&*client, block_number, true).await {
                Ok(block) => TaskOutcome::BlockDone { block },
                Err(error) => recover(task, attempts, error).await,
            }
        }
        .boxed(),
    }
}

/// Task-local error recovery: range splitting first, then the backoff
/// schedule, then fatal.
async fn recover(task: Task, attempts: u32, error: EthClientError) -> TaskOutcome {
    let (from_block, to_block) = task.range();

    if !matches!(task, Task::Block { .. }) {
        if let SplitOutcome::Split(ranges) = split_ranges(&error, from_block, to_block) {
            warn!(
                %error,
                ?ranges,
                "provider rejected the range; splitting the task"
            );
            let tasks = ranges
                .into_iter()
                .map(|(from_block, to_block)| retarget(&task, from_block, to_block))
                .collect();
            return TaskOutcome::Split { tasks };
        }
    }

    // schema inconsistencies get a single retry, everything else walks the
    // full backoff schedule
    let budget = if matches!(error, EthClientError::InconsistentResponse(_)) {
        1
    } else {
        RETRY_SCHEDULE_SECS.len() as u32
    };
    if attempts >= budget {
        error!(%error, %from_block, %to_block, "task retries exhausted");
        return TaskOutcome::Failed {
            error: HistoricalError::RetriesExhausted {
                from_block,
                to_block,
                source: error,
            },
        };
    }

    let slot = (attempts as usize).min(RETRY_SCHEDULE_SECS.len() - 1);
    debug!(%error, %from_block, retry_in = RETRY_SCHEDULE_SECS[slot], "task failed; backing off");
    tokio::time::sleep(Duration::from_secs(RETRY_SCHEDULE_SECS[slot])).await;
    TaskOutcome::Requeue {
        task,
        attempts: attempts + 1,
    }
}

fn retarget(task: &Task, from_block: u64, to_block: u64) -> Task {
    match task {
        Task::LogRange { source_index, .. } => Task::LogRange {
            source_index: *source_index,
            from_block,
            to_block,
        },
        Task::FactoryRange { factory_id, .. } => Task::FactoryRange {
            factory_id: factory_id.clone(),
            from_block,
            to_block,
        },
        Task::ChildRange { source_index, .. } => Task::ChildRange {
            source_index: *source_index,
            from_block,
            to_block,
        },
        Task::Block { .. } => task.clone(),
    }
}

fn log_query_for(filter: &Filter, from_block: u64, to_block: u64) -> LogQuery {
    let mut query = LogQuery::range(from_block, to_block);
    let Filter::Log(log_filter) = filter else {
        return query;
    };
    match &log_filter.address {
        AddressCriteria::One(address) => query.addresses = vec![*address],
        AddressCriteria::Many(addresses) => query.addresses = addresses.clone(),
        AddressCriteria::Any | AddressCriteria::Factory(_) => {}
    }
    for (position, criteria) in log_filter.topics.iter().enumerate() {
        match criteria {
            TopicCriteria::One(topic) => query.topics[position] = Some(vec![*topic]),
            TopicCriteria::OneOf(topics) => query.topics[position] = Some(topics.clone()),
            TopicCriteria::Any => {}
        }
    }
    query
}

/// Scans a factory's creation events and persists the derived children.
async fn run_factory_range<TClient: EthClient, TStore: SyncStore>(
    client: &TClient,
    store: &TStore,
    chain_id: u64,
    factory: &LogFactory,
    query: LogQuery,
    from_block: u64,
    to_block: u64,
) -> Result<()> {
    let logs = client.logs(query).await?;

    let mut children = ChildAddresses::new();
    for log in &logs {
        let Some(address) = factory.child_address(log) else {
            warn!(
                block = log.block_number,
                log_index = log.log_index,
                "factory log without extractable child address"
            );
            continue;
        };
        let first_seen = children.get(&address).copied().unwrap_or(u64::MAX);
        children.insert(address, first_seen.min(log.block_number));
    }

    if !children.is_empty() {
        store
            .insert_child_addresses(factory.clone(), chain_id, children)
            .await?;
    }
    store
        .insert_factory_intervals(factory.clone(), (from_block, to_block))
        .await?;
    Ok(())
}

/// Scans known child addresses in batches.
async fn run_child_range<TClient: EthClient, TStore: SyncStore>(
    client: &TClient,
    store: &TStore,
    factory: &LogFactory,
    topics: &[TopicCriteria; 4],
    from_block: u64,
    to_block: u64,
    child_batch_size: usize,
) -> Result<Vec<rpc::Log>> {
    let children = store.get_child_addresses(factory.clone()).await?;
    let mut addresses: Vec<_> = children
        .into_iter()
        .filter(|(_, first_seen)| *first_seen <= to_block)
        .map(|(address, _)| address)
        .collect();
    addresses.sort_unstable();

    let mut logs = Vec::new();
    for batch in addresses.chunks(child_batch_size.max(1)) {
        let mut query = LogQuery::range(from_block, to_block).with_addresses(batch.to_vec());
        for (position, criteria) in topics.iter().enumerate() {
            match criteria {
                TopicCriteria::One(topic) => query.topics[position] = Some(vec![*topic]),
                TopicCriteria::OneOf(values) => query.topics[position] = Some(values.clone()),
                TopicCriteria::Any => {}
            }
        }
        logs.extend(client.logs(query).await?);
    }
    Ok(logs)
}

/// Seals every block that is ready, in ascending order.
async fn drain_seals<TClient, TStore>(
    state: &mut HistoricalState,
    ctx: &HistoricalCtx<TClient, TStore>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    while let Some((block, work)) = state.next_seal() {
        let mut retried = false;
        loop {
            match seal_block(state, &block, &work, ctx).await {
                Ok(()) => break,
                Err(error) if !retried => {
                    warn!(%error, block = work.block_number, "seal failed; retrying once");
                    retried = true;
                }
                Err(error) => return Err(error),
            }
        }
        state.complete_seal(work.block_number);
    }
    Ok(())
}

/// Persists one block's rows and ledger intervals.
async fn seal_block<TClient, TStore>(
    state: &HistoricalState,
    block: &rpc::Block,
    work: &SealWork,
    ctx: &HistoricalCtx<TClient, TStore>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let chain_id = state.chain_id;
    let store = &*ctx.store;
    let client = &*ctx.client;

    store
        .insert_blocks(vec![BlockRecord::from_rpc(chain_id, block)])
        .await?;

    let tx_by_hash: HashMap<B256, &rpc::Transaction> = block
        .transactions
        .iter()
        .map(|tx| (tx.hash, tx))
        .collect();

    let mut receipts: Option<Vec<rpc::TransactionReceipt>> = None;
    let mut traces: Option<Vec<TraceRecord>> = None;
    let mut children: HashMap<String, ChildAddresses> = HashMap::new();

    for entry in &work.entries {
        let source = &state.sources[entry.source_index];

        match &entry.kind {
            SealKind::Logs(logs) => {
                let mut log_records = Vec::with_capacity(logs.len());
                let mut transactions = Vec::with_capacity(logs.len());
                for log in logs {
                    if log.block_hash != block.hash {
                        return Err(EthClientError::InconsistentResponse(format!(
                            "log {} carries block hash {}, expected {}",
                            log.log_index, log.block_hash, block.hash
                        ))
                        .into());
                    }
                    let transaction =
                        tx_by_hash.get(&log.transaction_hash).ok_or_else(|| {
                            EthClientError::InconsistentResponse(format!(
                                "log transaction {} missing from block {}",
                                log.transaction_hash, block.number
                            ))
                        })?;
                    log_records.push(LogRecord::from_rpc(chain_id, block.timestamp, log));
                    transactions.push(TransactionRecord::from_rpc(
                        chain_id,
                        block.timestamp,
                        transaction,
                    ));
                }

                if source.filter.requires_receipts() {
                    let all = fetch_receipts(client, block, &mut receipts).await?;
                    let wanted: Vec<ReceiptRecord> = all
                        .iter()
                        .filter(|r| tx_by_hash.contains_key(&r.transaction_hash))
                        .filter(|r| {
                            log_records
                                .iter()
                                .any(|l| l.transaction_hash == r.transaction_hash)
                        })
                        .map(|r| ReceiptRecord::from_rpc(chain_id, r))
                        .collect();
                    store.insert_transaction_receipts(wanted).await?;
                }
                store.insert_logs(log_records).await?;
                store.insert_transactions(transactions).await?;
            }
            SealKind::Block => {}
            SealKind::Derived => {
                seal_derived(
                    state,
                    block,
                    &source.filter,
                    ctx,
                    &tx_by_hash,
                    &mut receipts,
                    &mut traces,
                    &mut children,
                )
                .await?;
            }
        }

        store
            .insert_intervals(chain_id, vec![(source.filter.clone(), entry.interval)])
            .await?;
    }

    Ok(())
}

/// Persists trace / transfer / transaction rows of one block for one source.
#[expect(clippy::too_many_arguments, reason = "seal-scoped caches")]
async fn seal_derived<TClient, TStore>(
    state: &HistoricalState,
    block: &rpc::Block,
    filter: &Filter,
    ctx: &HistoricalCtx<TClient, TStore>,
    tx_by_hash: &HashMap<B256, &rpc::Transaction>,
    receipts: &mut Option<Vec<rpc::TransactionReceipt>>,
    traces: &mut Option<Vec<TraceRecord>>,
    children: &mut HashMap<String, ChildAddresses>,
) -> Result<()>
where
    TClient: EthClient,
    TStore: SyncStore,
{
    let chain_id = state.chain_id;
    let store = &*ctx.store;
    let client = &*ctx.client;

    for factory in filter.factories() {
        let id = factory.id();
        if !children.contains_key(&id) {
            let set = store.get_child_addresses(factory.clone()).await?;
            children.insert(id, set);
        }
    }

    match filter {
        Filter::Trace(_) | Filter::Transfer(_) => {
            if traces.is_none() {
                *traces = Some(flatten_block_traces(client, chain_id, block, tx_by_hash).await?);
            }
            let rows = traces.as_ref().expect("traces just fetched");

            let matched: Vec<TraceRecord> = rows
                .iter()
                .filter(|trace| match filter {
                    Filter::Trace(f) => f.matches(
                        trace,
                        child_set(children, &f.from_address),
                        child_set(children, &f.to_address),
                    ),
                    Filter::Transfer(f) => f.matches(
                        trace,
                        child_set(children, &f.from_address),
                        child_set(children, &f.to_address),
                    ),
                    _ => false,
                })
                .cloned()
                .collect();

            let transactions: Vec<TransactionRecord> = matched
                .iter()
                .map(|t| t.transaction_hash)
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .filter_map(|hash| tx_by_hash.get(&hash))
                .map(|tx| TransactionRecord::from_rpc(chain_id, block.timestamp, tx))
                .collect();

            if filter.requires_receipts() && !matched.is_empty() {
                let all = fetch_receipts(client, block, receipts).await?;
                let wanted: Vec<ReceiptRecord> = all
                    .iter()
                    .filter(|r| matched.iter().any(|t| t.transaction_hash == r.transaction_hash))
                    .map(|r| ReceiptRecord::from_rpc(chain_id, r))
                    .collect();
                store.insert_transaction_receipts(wanted).await?;
            }
            store.insert_traces(matched).await?;
            store.insert_transactions(transactions).await?;
        }
        Filter::Transaction(f) => {
            let matched: Vec<TransactionRecord> = block
                .transactions
                .iter()
                .map(|tx| TransactionRecord::from_rpc(chain_id, block.timestamp, tx))
                .filter(|tx| f.matches_weak(tx))
                .collect();

            if filter.requires_receipts() && !matched.is_empty() {
                let all = fetch_receipts(client, block, receipts).await?;
                let wanted: Vec<ReceiptRecord> = all
                    .iter()
                    .filter(|r| matched.iter().any(|t| t.hash == r.transaction_hash))
                    .map(|r| ReceiptRecord::from_rpc(chain_id, r))
                    .collect();
                store.insert_transaction_receipts(wanted).await?;
            }
            store.insert_transactions(matched).await?;
        }
        _ => {}
    }
    Ok(())
}

fn child_set<'a>(
    children: &'a HashMap<String, ChildAddresses>,
    criteria: &AddressCriteria,
) -> Option<&'a ChildAddresses> {
    criteria.factory().and_then(|f| children.get(&f.id()))
}

async fn fetch_receipts<'a, TClient: EthClient>(
    client: &TClient,
    block: &rpc::Block,
    cache: &'a mut Option<Vec<rpc::TransactionReceipt>>,
) -> Result<&'a Vec<rpc::TransactionReceipt>> {
    if cache.is_none() {
        *cache = Some(client.block_receipts(block.hash).await?);
    }
    Ok(cache.as_ref().expect("receipts just fetched"))
}

async fn flatten_block_traces<TClient: EthClient>(
    client: &TClient,
    chain_id: u64,
    block: &rpc::Block,
    tx_by_hash: &HashMap<B256, &rpc::Transaction>,
) -> Result<Vec<TraceRecord>> {
    let results = client.trace_block_by_hash(block.hash).await?;
    let mut rows = Vec::new();
    for (position, result) in results.iter().enumerate() {
        let (tx_hash, tx_index) = match result.tx_hash.and_then(|h| tx_by_hash.get(&h)) {
            Some(tx) => (tx.hash, tx.transaction_index),
            None => match block.transactions.get(position) {
                Some(tx) => (tx.hash, tx.transaction_index),
                None => {
                    return Err(EthClientError::InconsistentResponse(format!(
                        "trace {position} of block {} references no known transaction",
                        block.number
                    ))
                    .into())
                }
            },
        };
        rows.extend(flatten_traces(
            chain_id,
            block.timestamp,
            block.number,
            tx_hash,
            tx_index,
            &result.result,
        ));
    }
    Ok(rows)
}
