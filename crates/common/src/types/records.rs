//! Store-row record types.
//!
//! Records are the durable, chain-keyed form of RPC data. Each event-bearing
//! record carries its [`Checkpoint`] so range scans can order events without
//! re-deriving coordinates.

use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use super::{
    checkpoint::{Checkpoint, EventKind},
    filter::Selector,
    rpc::{self, TransactionKind},
};

/// Minimal header view kept for the unfinalized local chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightBlock {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: u64,
    pub timestamp: u64,
}

impl From<&rpc::Block> for LightBlock {
    fn from(block: &rpc::Block) -> Self {
        LightBlock {
            hash: block.hash,
            parent_hash: block.parent_hash,
            number: block.number,
            timestamp: block.timestamp,
        }
    }
}

/// A stored block header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub chain_id: u64,
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub miner: Address,
    pub logs_bloom: Bloom,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: Option<u64>,
    pub extra_data: Bytes,
    pub checkpoint: Checkpoint,
}

impl BlockRecord {
    /// Builds the row from a wire block.
    ///
    /// Block events sort after every transaction-scoped event of the block,
    /// so the checkpoint pins `transaction_index` at its maximum.
    pub fn from_rpc(chain_id: u64, block: &rpc::Block) -> Self {
        BlockRecord {
            chain_id,
            number: block.number,
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp,
            miner: block.miner,
            logs_bloom: block.logs_bloom,
            gas_limit: block.gas_limit,
            gas_used: block.gas_used,
            base_fee_per_gas: block.base_fee_per_gas,
            extra_data: block.extra_data.clone(),
            checkpoint: Checkpoint {
                block_timestamp: block.timestamp,
                chain_id,
                block_number: block.number,
                transaction_index: Checkpoint::MAX.transaction_index,
                event_type: EventKind::Block.code(),
                event_index: 0,
            },
        }
    }

    /// The light header view of this row.
    pub fn light(&self) -> LightBlock {
        LightBlock {
            hash: self.hash,
            parent_hash: self.parent_hash,
            number: self.number,
            timestamp: self.timestamp,
        }
    }

    /// EIP-55 checksummed miner address.
    pub fn miner_checksummed(&self) -> String {
        rpc::checksum(&self.miner)
    }
}

/// A stored log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub chain_id: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub address: Address,
    pub topic0: Option<B256>,
    pub topic1: Option<B256>,
    pub topic2: Option<B256>,
    pub topic3: Option<B256>,
    pub data: Bytes,
    pub checkpoint: Checkpoint,
}

impl LogRecord {
    /// Builds the row from a wire log; the containing block supplies the
    /// checkpoint timestamp.
    pub fn from_rpc(chain_id: u64, block_timestamp: u64, log: &rpc::Log) -> Self {
        LogRecord {
            chain_id,
            block_number: log.block_number,
            log_index: log.log_index,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            transaction_index: log.transaction_index,
            address: log.address,
            topic0: log.topics.first().copied(),
            topic1: log.topics.get(1).copied(),
            topic2: log.topics.get(2).copied(),
            topic3: log.topics.get(3).copied(),
            data: log.data.clone(),
            checkpoint: Checkpoint {
                block_timestamp,
                chain_id,
                block_number: log.block_number,
                transaction_index: log.transaction_index,
                event_type: EventKind::Log.code(),
                event_index: log.log_index,
            },
        }
    }

    /// The topics as a positional array.
    pub fn topics(&self) -> [Option<B256>; 4] {
        [self.topic0, self.topic1, self.topic2, self.topic3]
    }

    /// Reconstructs the wire form (used for factory child extraction).
    pub fn to_rpc(&self) -> rpc::Log {
        rpc::Log {
            address: self.address,
            topics: [self.topic0, self.topic1, self.topic2, self.topic3]
                .into_iter()
                .flatten()
                .collect(),
            data: self.data.clone(),
            block_number: self.block_number,
            block_hash: self.block_hash,
            transaction_hash: self.transaction_hash,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
            removed: false,
        }
    }

    /// EIP-55 checksummed emitting address.
    pub fn address_checksummed(&self) -> String {
        rpc::checksum(&self.address)
    }
}

/// A stored transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub chain_id: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas: u64,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub input: Bytes,
    pub v: Option<U256>,
    pub r: Option<U256>,
    pub s: Option<U256>,
    pub transaction_type: Option<u64>,
    pub access_list: Option<Vec<rpc::AccessListItem>>,
    pub checkpoint: Checkpoint,
}

impl TransactionRecord {
    /// Builds the row from a wire transaction.
    pub fn from_rpc(chain_id: u64, block_timestamp: u64, tx: &rpc::Transaction) -> Self {
        TransactionRecord {
            chain_id,
            block_number: tx.block_number,
            transaction_index: tx.transaction_index,
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            nonce: tx.nonce,
            gas: tx.gas,
            gas_price: tx.gas_price,
            max_fee_per_gas: tx.max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
            input: tx.input.clone(),
            v: tx.v,
            r: tx.r,
            s: tx.s,
            transaction_type: tx.transaction_type,
            access_list: tx.access_list.clone(),
            checkpoint: Checkpoint {
                block_timestamp,
                chain_id,
                block_number: tx.block_number,
                transaction_index: tx.transaction_index,
                event_type: EventKind::Transaction.code(),
                event_index: 0,
            },
        }
    }

    /// Decoded envelope kind.
    pub fn kind(&self) -> TransactionKind {
        TransactionKind::from_code(self.transaction_type)
    }

    /// EIP-55 checksummed sender.
    pub fn from_checksummed(&self) -> String {
        rpc::checksum(&self.from)
    }

    /// EIP-55 checksummed recipient, if any.
    pub fn to_checksummed(&self) -> Option<String> {
        self.to.as_ref().map(rpc::checksum)
    }
}

/// A stored receipt row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub chain_id: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    pub transaction_hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub status: u64,
    pub effective_gas_price: Option<U256>,
    pub transaction_type: Option<u64>,
}

impl ReceiptRecord {
    /// Builds the row from a wire receipt.
    pub fn from_rpc(chain_id: u64, receipt: &rpc::TransactionReceipt) -> Self {
        ReceiptRecord {
            chain_id,
            block_number: receipt.block_number,
            transaction_index: receipt.transaction_index,
            transaction_hash: receipt.transaction_hash,
            from: receipt.from,
            to: receipt.to,
            contract_address: receipt.contract_address,
            cumulative_gas_used: receipt.cumulative_gas_used,
            gas_used: receipt.gas_used,
            status: receipt.status,
            effective_gas_price: receipt.effective_gas_price,
            transaction_type: receipt.transaction_type,
        }
    }

    /// `"success"` or `"reverted"`.
    pub fn status_str(&self) -> &'static str {
        if self.status == 1 {
            "success"
        } else {
            "reverted"
        }
    }

    /// Whether the transaction reverted.
    pub fn is_reverted(&self) -> bool {
        self.status != 1
    }
}

/// A stored flattened call-trace row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub chain_id: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    pub trace_index: u64,
    pub transaction_hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub call_type: String,
    pub input: Bytes,
    pub output: Option<Bytes>,
    pub function_selector: Option<Selector>,
    pub is_reverted: bool,
    pub subcalls: u64,
    pub checkpoint: Checkpoint,
}

impl TraceRecord {
    /// Whether this trace moves native value (a *transfer*).
    pub fn is_transfer(&self) -> bool {
        self.value.is_some_and(|v| !v.is_zero())
    }
}

/// Flattens one transaction's `callTracer` tree into trace rows.
///
/// Rows are emitted in depth-first preorder; `trace_index` is the preorder
/// position. A frame is reverted if it or any ancestor carries an error.
pub fn flatten_traces(
    chain_id: u64,
    block_timestamp: u64,
    block_number: u64,
    transaction_hash: B256,
    transaction_index: u64,
    root: &rpc::TraceFrame,
) -> Vec<TraceRecord> {
    fn walk(
        frame: &rpc::TraceFrame,
        ancestor_reverted: bool,
        next_index: &mut u64,
        out: &mut Vec<TraceRecord>,
        chain_id: u64,
        block_timestamp: u64,
        block_number: u64,
        transaction_hash: B256,
        transaction_index: u64,
    ) {
        let reverted = ancestor_reverted || frame.error.is_some();
        let trace_index = *next_index;
        *next_index += 1;

        out.push(TraceRecord {
            chain_id,
            block_number,
            transaction_index,
            trace_index,
            transaction_hash,
            from: frame.from,
            to: frame.to,
            value: frame.value,
            call_type: frame.call_type.clone(),
            input: frame.input.clone(),
            output: frame.output.clone(),
            function_selector: (frame.input.len() >= 4)
                .then(|| Selector::from_slice(&frame.input[..4])),
            is_reverted: reverted,
            subcalls: frame.calls.len() as u64,
            checkpoint: Checkpoint {
                block_timestamp,
                chain_id,
                block_number,
                transaction_index,
                event_type: EventKind::Trace.code(),
                event_index: trace_index,
            },
        });

        for call in &frame.calls {
            walk(
                call,
                reverted,
                next_index,
                out,
                chain_id,
                block_timestamp,
                block_number,
                transaction_hash,
                transaction_index,
            );
        }
    }

    let mut out = Vec::new();
    let mut next_index = 0;
    walk(
        root,
        false,
        &mut next_index,
        &mut out,
        chain_id,
        block_timestamp,
        block_number,
        transaction_hash,
        transaction_index,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(error: Option<&str>, calls: Vec<rpc::TraceFrame>) -> rpc::TraceFrame {
        rpc::TraceFrame {
            call_type: "CALL".to_owned(),
            from: Address::repeat_byte(1),
            to: Some(Address::repeat_byte(2)),
            value: Some(U256::from(1)),
            gas: Some(21000),
            gas_used: Some(21000),
            input: vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee].into(),
            output: None,
            error: error.map(str::to_owned),
            revert_reason: None,
            calls,
        }
    }

    #[test]
    fn test_flatten_assigns_preorder_indices() {
        let tree = make_frame(
            None,
            vec![
                make_frame(None, vec![make_frame(None, vec![])]),
                make_frame(None, vec![]),
            ],
        );
        let rows = flatten_traces(1, 1000, 100, B256::repeat_byte(9), 2, &tree);

        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().map(|r| r.trace_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(rows[0].subcalls, 2);
        assert_eq!(rows[1].subcalls, 1);
        assert_eq!(rows[0].function_selector, Some(Selector::from([0xaa, 0xbb, 0xcc, 0xdd])));
        assert!(rows.iter().all(|r| r.is_transfer()));
    }

    #[test]
    fn test_flatten_propagates_revert_to_descendants() {
        let tree = make_frame(
            None,
            vec![
                make_frame(Some("execution reverted"), vec![make_frame(None, vec![])]),
                make_frame(None, vec![]),
            ],
        );
        let rows = flatten_traces(1, 1000, 100, B256::repeat_byte(9), 0, &tree);

        assert!(!rows[0].is_reverted);
        assert!(rows[1].is_reverted);
        assert!(rows[2].is_reverted, "descendant of reverted frame");
        assert!(!rows[3].is_reverted);
    }

    #[test]
    fn test_checkpoint_order_within_block() {
        let block = rpc::Block {
            hash: B256::repeat_byte(1),
            parent_hash: B256::repeat_byte(2),
            number: 100,
            timestamp: 1000,
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
        };
        let block_row = BlockRecord::from_rpc(1, &block);

        let log = rpc::Log {
            address: Address::ZERO,
            topics: vec![],
            data: Default::default(),
            block_number: 100,
            block_hash: block.hash,
            transaction_hash: B256::repeat_byte(3),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        };
        let log_row = LogRecord::from_rpc(1, 1000, &log);

        // block events sort after transaction-scoped events of the block
        assert!(log_row.checkpoint < block_row.checkpoint);
        assert!(block_row.checkpoint < Checkpoint::block_start(1000, 1, 101));
    }
}
