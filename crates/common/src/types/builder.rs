//! Assembles per-source [`Event`]s from one block's matched rows.

use std::{collections::HashMap, sync::Arc};

use super::{
    checkpoint::EventKind,
    events::{BlockEventRows, Event},
    filter::{ChildAddresses, Filter},
    records::{ReceiptRecord, TransactionRecord},
};

/// Builds the ordered event list of one block.
///
/// Every `(source, row)` match yields one event; a row matched by several
/// sources is emitted once per source. The result is sorted by checkpoint
/// (and source index for identical coordinates).
pub fn build_events(
    sources: &[(usize, Filter)],
    rows: &BlockEventRows,
    children: &HashMap<String, ChildAddresses>,
) -> Vec<Event> {
    let Some(block) = &rows.block else {
        return Vec::new();
    };
    let block = Arc::new(block.clone());
    let chain_id = block.chain_id;

    let transactions: HashMap<u64, &TransactionRecord> = rows
        .transactions
        .iter()
        .map(|tx| (tx.transaction_index, tx))
        .collect();
    let receipts: HashMap<u64, &ReceiptRecord> = rows
        .receipts
        .iter()
        .map(|r| (r.transaction_index, r))
        .collect();
    let child_set = |factory: Option<&super::filter::LogFactory>| -> Option<&ChildAddresses> {
        factory.and_then(|f| children.get(&f.id()))
    };

    let mut events = Vec::new();
    for (source_index, filter) in sources {
        match filter {
            Filter::Log(f) => {
                for log in &rows.logs {
                    if !f.matches(&log.to_rpc(), child_set(f.address.factory())) {
                        continue;
                    }
                    events.push(Event {
                        chain_id,
                        source_index: *source_index,
                        checkpoint: log.checkpoint,
                        kind: EventKind::Log,
                        block: block.clone(),
                        log: Some(log.clone()),
                        transaction: transactions.get(&log.transaction_index).map(|tx| (*tx).clone()),
                        transaction_receipt: f
                            .include_receipts
                            .then(|| receipts.get(&log.transaction_index).map(|r| (*r).clone()))
                            .flatten(),
                        trace: None,
                    });
                }
            }
            Filter::Trace(f) => {
                for trace in &rows.traces {
                    if !f.matches(
                        trace,
                        child_set(f.from_address.factory()),
                        child_set(f.to_address.factory()),
                    ) {
                        continue;
                    }
                    events.push(Event {
                        chain_id,
                        source_index: *source_index,
                        checkpoint: trace.checkpoint,
                        kind: EventKind::Trace,
                        block: block.clone(),
                        log: None,
                        transaction: transactions.get(&trace.transaction_index).map(|tx| (*tx).clone()),
                        transaction_receipt: f
                            .include_receipts
                            .then(|| receipts.get(&trace.transaction_index).map(|r| (*r).clone()))
                            .flatten(),
                        trace: Some(trace.clone()),
                    });
                }
            }
            Filter::Transfer(f) => {
                for trace in &rows.traces {
                    if !f.matches(
                        trace,
                        child_set(f.from_address.factory()),
                        child_set(f.to_address.factory()),
                    ) {
                        continue;
                    }
                    events.push(Event {
                        chain_id,
                        source_index: *source_index,
                        checkpoint: trace.checkpoint,
                        kind: EventKind::Transfer,
                        block: block.clone(),
                        log: None,
                        transaction: transactions.get(&trace.transaction_index).map(|tx| (*tx).clone()),
                        transaction_receipt: f
                            .include_receipts
                            .then(|| receipts.get(&trace.transaction_index).map(|r| (*r).clone()))
                            .flatten(),
                        trace: Some(trace.clone()),
                    });
                }
            }
            Filter::Transaction(f) => {
                for transaction in rows.transactions.iter() {
                    let reverted = receipts
                        .get(&transaction.transaction_index)
                        .map(|r| r.is_reverted());
                    if !f.matches(
                        transaction,
                        reverted,
                        child_set(f.from_address.factory()),
                        child_set(f.to_address.factory()),
                    ) {
                        continue;
                    }
                    events.push(Event {
                        chain_id,
                        source_index: *source_index,
                        checkpoint: transaction.checkpoint,
                        kind: EventKind::Transaction,
                        block: block.clone(),
                        log: None,
                        transaction: Some(transaction.clone()),
                        transaction_receipt: receipts
                            .get(&transaction.transaction_index)
                            .map(|r| (*r).clone()),
                        trace: None,
                    });
                }
            }
            Filter::Block(f) => {
                if f.matches(block.number) {
                    events.push(Event {
                        chain_id,
                        source_index: *source_index,
                        checkpoint: block.checkpoint,
                        kind: EventKind::Block,
                        block: block.clone(),
                        log: None,
                        transaction: None,
                        transaction_receipt: None,
                        trace: None,
                    });
                }
            }
        }
    }

    events.sort_by(|a, b| {
        a.checkpoint
            .cmp(&b.checkpoint)
            .then(a.source_index.cmp(&b.source_index))
    });
    events
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};

    use super::*;
    use crate::types::{
        checkpoint::Checkpoint,
        filter::{AddressCriteria, BlockFilter, LogFilter, TopicCriteria},
        records::{BlockRecord, LogRecord},
    };

    fn make_block(number: u64, timestamp: u64) -> BlockRecord {
        BlockRecord {
            chain_id: 1,
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
                chain_id: 1,
                block_number: number,
                transaction_index: Checkpoint::MAX.transaction_index,
                event_type: EventKind::Block.code(),
                event_index: 0,
            },
        }
    }

    fn make_log(number: u64, log_index: u64, address: Address) -> LogRecord {
        LogRecord {
            chain_id: 1,
            block_number: number,
            log_index,
            block_hash: B256::with_last_byte(number as u8),
            transaction_hash: B256::repeat_byte(0xf0),
            transaction_index: 0,
            address,
            topic0: None,
            topic1: None,
            topic2: None,
            topic3: None,
            data: Default::default(),
            checkpoint: Checkpoint {
                block_timestamp: number * 10,
                chain_id: 1,
                block_number: number,
                transaction_index: 0,
                event_type: EventKind::Log.code(),
                event_index: log_index,
            },
        }
    }

    #[test]
    fn test_events_ordered_by_checkpoint_with_block_event_last() {
        let address = Address::repeat_byte(0xaa);
        let sources = vec![
            (
                0,
                Filter::Log(LogFilter {
                    chain_id: 1,
                    address: AddressCriteria::One(address),
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
            ),
            (
                1,
                Filter::Block(BlockFilter {
                    chain_id: 1,
                    interval: 1,
                    offset: 0,
                    from_block: 0,
                    to_block: None,
                }),
            ),
        ];

        let rows = BlockEventRows {
            block: Some(make_block(100, 1000)),
            logs: vec![make_log(100, 1, address), make_log(100, 0, address)],
            ..Default::default()
        };

        let events = build_events(&sources, &rows, &HashMap::new());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::Log);
        assert_eq!(events[0].checkpoint.event_index, 0);
        assert_eq!(events[1].checkpoint.event_index, 1);
        // the block event sorts after every transaction-scoped event
        assert_eq!(events[2].kind, EventKind::Block);
        assert!(events[1].checkpoint < events[2].checkpoint);
    }

    #[test]
    fn test_unmatched_address_yields_no_events() {
        let sources = vec![(
            0,
            Filter::Log(LogFilter {
                chain_id: 1,
                address: AddressCriteria::One(Address::repeat_byte(0x01)),
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
        )];
        let rows = BlockEventRows {
            block: Some(make_block(100, 1000)),
            logs: vec![make_log(100, 0, Address::repeat_byte(0x02))],
            ..Default::default()
        };
        assert!(build_events(&sources, &rows, &HashMap::new()).is_empty());
    }
}
