//! End-to-end sync: historical backfill into realtime handoff against a
//! scripted chain.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use eventide_common::{
    types::{
        filter::{AddressCriteria, Filter, LogFilter, TopicCriteria},
        rpc,
    },
    BlockTag, Checkpoint, EthClient, EthClientError, Event, IndexingError, IndexingRuntime,
    LogQuery, SyncStore,
};
use eventide_config::{ChainParams, Ordering, Source, SyncConfig};
use eventide_coordinator::Coordinator;
use tokio::sync::Mutex;

const FINALIZED: u64 = 95;
const HEAD: u64 = 105;
const SOURCE_START: u64 = 90;

fn watched() -> Address {
    Address::repeat_byte(0xaa)
}

fn block_hash(number: u64) -> B256 {
    B256::with_last_byte(number as u8)
}

fn tx_hash(number: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xf0;
    bytes[31] = number as u8;
    B256::from(bytes)
}

/// Scripted chain: block `n` has hash `h(n)`, one transaction, and one
/// watched log.
#[derive(Debug)]
struct ScriptedClient;

fn make_transaction(number: u64) -> rpc::Transaction {
    rpc::Transaction {
        hash: tx_hash(number),
        nonce: 0,
        block_hash: block_hash(number),
        block_number: number,
        transaction_index: 0,
        from: Address::repeat_byte(0x11),
        to: Some(watched()),
        value: U256::ZERO,
        gas: 21_000,
        gas_price: None,
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        input: Default::default(),
        v: None,
        r: None,
        s: None,
        transaction_type: Some(2),
        access_list: None,
    }
}

fn make_block(number: u64) -> rpc::Block {
    rpc::Block {
        hash: block_hash(number),
        parent_hash: block_hash(number.wrapping_sub(1)),
        number,
        timestamp: 1_000 + number,
        miner: Address::ZERO,
        logs_bloom: Default::default(),
        state_root: B256::ZERO,
        transactions_root: B256::ZERO,
        receipts_root: B256::ZERO,
        difficulty: U256::ZERO,
        total_difficulty: None,
        gas_limit: 30_000_000,
        gas_used: 21_000,
        base_fee_per_gas: None,
        size: None,
        extra_data: Default::default(),
        mix_hash: None,
        nonce: None,
        transactions: vec![make_transaction(number)],
    }
}

fn make_log(number: u64) -> rpc::Log {
    rpc::Log {
        address: watched(),
        topics: vec![B256::repeat_byte(0x22)],
        data: Default::default(),
        block_number: number,
        block_hash: block_hash(number),
        transaction_hash: tx_hash(number),
        transaction_index: 0,
        log_index: 0,
        removed: false,
    }
}

#[async_trait]
impl EthClient for ScriptedClient {
    async fn block_number(&self) -> Result<u64, EthClientError> {
        Ok(HEAD)
    }

    async fn block_by_number(
        &self,
        tag: BlockTag,
        _with_transactions: bool,
    ) -> Result<Option<rpc::Block>, EthClientError> {
        let number = match tag {
            BlockTag::Latest => FINALIZED + 1,
            BlockTag::Number(n) => n,
        };
        Ok(Some(make_block(number)))
    }

    async fn block_by_hash(
        &self,
        hash: B256,
        _with_transactions: bool,
    ) -> Result<Option<rpc::Block>, EthClientError> {
        let number = (SOURCE_START..=HEAD).find(|n| block_hash(*n) == hash);
        Ok(number.map(make_block))
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<rpc::Log>, EthClientError> {
        if let Some(hash) = query.block_hash {
            let number = (SOURCE_START..=HEAD).find(|n| block_hash(*n) == hash);
            return Ok(number.map(make_log).into_iter().collect());
        }
        let (Some(from), Some(to)) = (query.from_block, query.to_block) else {
            return Ok(vec![]);
        };
        Ok((from..=to).map(make_log).collect())
    }

    async fn transaction_receipt(
        &self,
        _hash: B256,
    ) -> Result<Option<rpc::TransactionReceipt>, EthClientError> {
        Ok(None)
    }

    async fn block_receipts(
        &self,
        _hash: B256,
    ) -> Result<Vec<rpc::TransactionReceipt>, EthClientError> {
        Ok(vec![])
    }

    async fn trace_block_by_hash(
        &self,
        _hash: B256,
    ) -> Result<Vec<rpc::TraceResult>, EthClientError> {
        Ok(vec![])
    }
}

/// Records everything the coordinator dispatches.
#[derive(Debug, Default)]
struct RecordingRuntime {
    setup_calls: Mutex<usize>,
    historical: Mutex<Vec<Event>>,
    realtime: Mutex<Vec<Event>>,
}

#[async_trait]
impl IndexingRuntime for RecordingRuntime {
    async fn process_setup_events(&self) -> Result<(), IndexingError> {
        *self.setup_calls.lock().await += 1;
        Ok(())
    }

    async fn process_historical_events(&self, events: Vec<Event>) -> Result<(), IndexingError> {
        self.historical.lock().await.extend(events);
        Ok(())
    }

    async fn process_realtime_events(&self, events: Vec<Event>) -> Result<(), IndexingError> {
        self.realtime.lock().await.extend(events);
        Ok(())
    }

    async fn revert(&self, _checkpoint: Checkpoint) -> Result<(), IndexingError> {
        Ok(())
    }

    async fn finalize(&self, _checkpoint: Checkpoint) -> Result<(), IndexingError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_backfill_then_realtime_handoff() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(eventide_database::init_db_storage(dir.path()).unwrap());
    let runtime = Arc::new(RecordingRuntime::default());

    let chain = ChainParams::new("mainnet", 1, 10, "http://localhost:8545")
        .with_polling_interval_ms(10);
    let filter = Filter::Log(LogFilter {
        chain_id: 1,
        address: AddressCriteria::One(watched()),
        topics: [
            TopicCriteria::Any,
            TopicCriteria::Any,
            TopicCriteria::Any,
            TopicCriteria::Any,
        ],
        from_block: SOURCE_START,
        to_block: None,
        include_receipts: false,
    });
    let config = SyncConfig::new(
        vec![chain],
        vec![Source::new("watched", filter.clone())],
        Ordering::Omnichain,
    );

    let mut clients = HashMap::new();
    clients.insert(1u64, Arc::new(ScriptedClient));

    let (coordinator, shutdown) =
        Coordinator::new(config, clients, store.clone(), runtime.clone());
    let run = tokio::spawn(coordinator.run());

    // wait until the realtime block past the finalized tip is durably
    // indexed, then stop
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("sync did not reach the realtime block in time");
        }
        if let Some(row) = store.get_checkpoint_row(1).await.unwrap() {
            if row.safe_checkpoint.block_number > FINALIZED {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.shutdown();
    run.await.unwrap().unwrap();

    // every historical block emitted exactly one log event, in order
    let historical = runtime.historical.lock().await;
    let blocks: Vec<u64> = historical
        .iter()
        .map(|e| e.checkpoint.block_number)
        .collect();
    assert_eq!(blocks, (SOURCE_START..=FINALIZED).collect::<Vec<u64>>());

    // the realtime block flowed through after the handoff
    let realtime = runtime.realtime.lock().await;
    assert!(realtime
        .iter()
        .any(|e| e.checkpoint.block_number == FINALIZED + 1));

    // setup ran exactly once (no prior checkpoint row)
    assert_eq!(*runtime.setup_calls.lock().await, 1);

    // the interval ledger covers the whole historical range
    let intervals = store.get_intervals(vec![filter]).await.unwrap();
    assert!(!intervals[0].intervals.is_empty());
    assert_eq!(intervals[0].intervals[0].0, SOURCE_START);
    assert!(intervals[0].intervals[0].1 >= FINALIZED);
}
