//! Cross-chain ordering of the assembled stream.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use eventide_assembler::{AssemblerEvent, ChainFeed, StreamAssembler};
use eventide_common::{
    types::{
        checkpoint::{Checkpoint, EventKind},
        filter::{AddressCriteria, Filter, LogFilter, TopicCriteria},
        records::{BlockRecord, LogRecord},
    },
    RealtimeEvent, SyncStore,
};
use eventide_config::Ordering;
use eventide_database::Storage;
use tokio::sync::{mpsc, watch};

fn make_block(chain_id: u64, number: u64, timestamp: u64) -> BlockRecord {
    BlockRecord {
        chain_id,
        number,
        hash: B256::with_last_byte(number as u8),
        parent_hash: B256::with_last_byte(number.wrapping_sub(1) as u8),
        timestamp,
        miner: Address::ZERO,
        logs_bloom: Default::default(),
        gas_limit: 0,
        gas_used: 0,
        base_fee_per_gas: None,
        extra_data: Default::default(),
        checkpoint: Checkpoint {
            block_timestamp: timestamp,
            chain_id,
            block_number: number,
            transaction_index: Checkpoint::MAX.transaction_index,
            event_type: EventKind::Block.code(),
            event_index: 0,
        },
    }
}

fn make_log(chain_id: u64, number: u64, timestamp: u64) -> LogRecord {
    LogRecord {
        chain_id,
        block_number: number,
        log_index: 0,
        block_hash: B256::with_last_byte(number as u8),
        transaction_hash: B256::repeat_byte(0xf0),
        transaction_index: 0,
        address: Address::repeat_byte(0xaa),
        topic0: None,
        topic1: None,
        topic2: None,
        topic3: None,
        data: Default::default(),
        checkpoint: Checkpoint {
            block_timestamp: timestamp,
            chain_id,
            block_number: number,
            transaction_index: 0,
            event_type: EventKind::Log.code(),
            event_index: 0,
        },
    }
}

fn any_log_filter(chain_id: u64, from_block: u64) -> Filter {
    Filter::Log(LogFilter {
        chain_id,
        address: AddressCriteria::Any,
        topics: [
            TopicCriteria::Any,
            TopicCriteria::Any,
            TopicCriteria::Any,
            TopicCriteria::Any,
        ],
        from_block,
        to_block: None,
        include_receipts: false,
    })
}

/// Seeds the store with one log-bearing block per chain:
/// chain 1 at block 100 / timestamp 1000, chain 137 at block 50 / 1001.
async fn seeded_store() -> (tempfile::TempDir, Arc<Storage>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(eventide_database::init_db_storage(dir.path()).unwrap());

    store
        .insert_blocks(vec![make_block(1, 100, 1000), make_block(137, 50, 1001)])
        .await
        .unwrap();
    store
        .insert_logs(vec![make_log(1, 100, 1000), make_log(137, 50, 1001)])
        .await
        .unwrap();
    (dir, store)
}

fn feed(
    store: &Arc<Storage>,
    chain_id: u64,
    source_index: usize,
    from_block: u64,
    end_block: u64,
) -> (ChainFeed<Storage>, mpsc::Sender<RealtimeEvent>) {
    let (sealed_tx, sealed_rx) = watch::channel(Some(end_block));
    // the historical range is fully sealed for these tests
    std::mem::forget(sealed_tx);
    let (realtime_tx, realtime_rx) = mpsc::channel(4);
    (
        ChainFeed {
            chain_id,
            sources: vec![(source_index, any_log_filter(chain_id, from_block))],
            store: store.clone(),
            sealed_rx,
            end_block,
            resume_after: None,
            realtime_rx,
        },
        realtime_tx,
    )
}

#[tokio::test]
async fn test_omnichain_orders_by_timestamp_across_chains() {
    let (_dir, store) = seeded_store().await;

    // chain 137 registered first; timestamp order must still win
    let (feed_137, tx_137) = feed(&store, 137, 1, 50, 50);
    let (feed_1, tx_1) = feed(&store, 1, 0, 100, 100);

    let mut assembler =
        StreamAssembler::new(Ordering::Omnichain, 93, 10_000, vec![feed_137, feed_1]);

    let first = assembler.next_event().await.unwrap().unwrap();
    let AssemblerEvent::Historical(batch) = first else {
        panic!("expected a historical batch");
    };
    assert_eq!(batch.chain_id, 1, "timestamp 1000 beats 1001");
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.events[0].checkpoint.block_timestamp, 1000);

    let second = assembler.next_event().await.unwrap().unwrap();
    let AssemblerEvent::Historical(batch) = second else {
        panic!("expected a historical batch");
    };
    assert_eq!(batch.chain_id, 137);

    let third = assembler.next_event().await.unwrap().unwrap();
    assert!(matches!(third, AssemblerEvent::HistoricalComplete));

    // closing the realtime channels ends the stream
    drop(tx_1);
    drop(tx_137);
    assert!(assembler.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_omnichain_batches_are_globally_ordered() {
    let (_dir, store) = seeded_store().await;
    let (feed_1, tx_1) = feed(&store, 1, 0, 100, 100);
    let (feed_137, tx_137) = feed(&store, 137, 1, 50, 50);
    let mut assembler =
        StreamAssembler::new(Ordering::Omnichain, 93, 10_000, vec![feed_1, feed_137]);

    let mut checkpoints = Vec::new();
    loop {
        match assembler.next_event().await.unwrap().unwrap() {
            AssemblerEvent::Historical(batch) => {
                checkpoints.extend(batch.events.iter().map(|e| e.checkpoint));
            }
            AssemblerEvent::HistoricalComplete => break,
            AssemblerEvent::Realtime(_) => panic!("no realtime events expected"),
        }
    }
    let mut sorted = checkpoints.clone();
    sorted.sort();
    assert_eq!(checkpoints, sorted);
    drop(tx_1);
    drop(tx_137);
}

#[tokio::test]
async fn test_multichain_emits_per_chain_independently() {
    let (_dir, store) = seeded_store().await;
    let (feed_137, tx_137) = feed(&store, 137, 1, 50, 50);
    let (feed_1, tx_1) = feed(&store, 1, 0, 100, 100);
    let mut assembler =
        StreamAssembler::new(Ordering::Multichain, 93, 10_000, vec![feed_137, feed_1]);

    // multichain does not wait for cross-chain order: the first registered
    // chain may emit first even with the later timestamp
    let first = assembler.next_event().await.unwrap().unwrap();
    let AssemblerEvent::Historical(batch) = first else {
        panic!("expected a historical batch");
    };
    assert_eq!(batch.chain_id, 137);

    let second = assembler.next_event().await.unwrap().unwrap();
    let AssemblerEvent::Historical(batch) = second else {
        panic!("expected a historical batch");
    };
    assert_eq!(batch.chain_id, 1);

    assert!(matches!(
        assembler.next_event().await.unwrap().unwrap(),
        AssemblerEvent::HistoricalComplete
    ));
    drop(tx_1);
    drop(tx_137);
}

#[tokio::test]
async fn test_realtime_events_flow_after_handoff() {
    let (_dir, store) = seeded_store().await;
    let (feed_1, tx_1) = feed(&store, 1, 0, 100, 100);
    let mut assembler = StreamAssembler::new(Ordering::Omnichain, 93, 10_000, vec![feed_1]);

    // drain historical
    loop {
        match assembler.next_event().await.unwrap().unwrap() {
            AssemblerEvent::HistoricalComplete => break,
            AssemblerEvent::Historical(_) => {}
            AssemblerEvent::Realtime(_) => panic!("too early"),
        }
    }

    tx_1.send(RealtimeEvent::Finalize {
        chain_id: 1,
        finalized: eventide_common::LightBlock {
            hash: B256::ZERO,
            parent_hash: B256::ZERO,
            number: 110,
            timestamp: 1100,
        },
    })
    .await
    .unwrap();
    drop(tx_1);

    let event = assembler.next_event().await.unwrap().unwrap();
    assert!(matches!(
        event,
        AssemblerEvent::Realtime(RealtimeEvent::Finalize { chain_id: 1, .. })
    ));
    assert!(assembler.next_event().await.unwrap().is_none());
}
