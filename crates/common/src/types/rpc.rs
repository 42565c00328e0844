//! Hand-modeled Ethereum JSON-RPC wire types.
//!
//! Numeric fields arrive as hex quantities; the `quantity` serde helpers
//! decode them into plain integers. Only the fields the sync core consumes
//! are modeled.

use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Serde helpers for hex-quantity integers (`"0x1b4"`).
pub mod quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a `u64` as a minimal hex quantity.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    /// Deserializes a hex quantity into a `u64`.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(raw: &str) -> Result<u64, String> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| format!("quantity missing 0x prefix: {raw}"))?;
        u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {raw}: {e}"))
    }

    /// Serde helpers for optional hex quantities.
    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serializes an optional `u64` as a hex quantity or `null`.
        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&format!("{v:#x}")),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes a hex quantity or `null` into an optional `u64`.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// A block returned by `eth_getBlockByNumber` / `eth_getBlockByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(with = "quantity")]
    pub number: u64,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    pub miner: Address,
    pub logs_bloom: Bloom,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub difficulty: U256,
    #[serde(default)]
    pub total_difficulty: Option<U256>,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(default, with = "quantity::opt")]
    pub base_fee_per_gas: Option<u64>,
    #[serde(default, with = "quantity::opt")]
    pub size: Option<u64>,
    pub extra_data: Bytes,
    #[serde(default)]
    pub mix_hash: Option<B256>,
    #[serde(default)]
    pub nonce: Option<Bytes>,
    /// Full transaction objects; empty when fetched without transactions.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A transaction embedded in a block fetched with `withTxs = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub block_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
    pub input: Bytes,
    #[serde(default)]
    pub v: Option<U256>,
    #[serde(default)]
    pub r: Option<U256>,
    #[serde(default)]
    pub s: Option<U256>,
    #[serde(default, rename = "type", with = "quantity::opt")]
    pub transaction_type: Option<u64>,
    #[serde(default)]
    pub access_list: Option<Vec<AccessListItem>>,
}

/// An EIP-2930 access-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

/// Decoded transaction envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Legacy,
    Eip2930,
    Eip1559,
    Deposit,
}

impl TransactionKind {
    /// Maps the wire `type` code to a kind; unknown codes fold to legacy.
    pub fn from_code(code: Option<u64>) -> Self {
        match code {
            Some(0x1) => TransactionKind::Eip2930,
            Some(0x2) => TransactionKind::Eip1559,
            Some(0x7e) => TransactionKind::Deposit,
            _ => TransactionKind::Legacy,
        }
    }

    /// The user-facing name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Legacy => "legacy",
            TransactionKind::Eip2930 => "eip2930",
            TransactionKind::Eip1559 => "eip1559",
            TransactionKind::Deposit => "deposit",
        }
    }
}

/// A log returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "quantity")]
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    #[serde(with = "quantity")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

impl Log {
    /// The log's `topic0` (event selector), if present.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// A receipt returned by `eth_getTransactionReceipt` / `eth_getBlockReceipts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    pub block_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub cumulative_gas_used: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
    pub logs_bloom: Bloom,
    #[serde(with = "quantity")]
    pub status: u64,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default, rename = "type", with = "quantity::opt")]
    pub transaction_type: Option<u64>,
}

impl TransactionReceipt {
    /// The user-facing receipt status.
    pub fn status_str(&self) -> &'static str {
        if self.status == 1 {
            "success"
        } else {
            "reverted"
        }
    }
}

/// A `callTracer` frame from `debug_traceBlockByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceFrame {
    /// Call opcode (`CALL`, `DELEGATECALL`, `STATICCALL`, `CREATE`, ...).
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default, with = "quantity::opt")]
    pub gas: Option<u64>,
    #[serde(default, with = "quantity::opt")]
    pub gas_used: Option<u64>,
    pub input: Bytes,
    #[serde(default)]
    pub output: Option<Bytes>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub revert_reason: Option<String>,
    #[serde(default)]
    pub calls: Vec<TraceFrame>,
}

/// One entry of a `debug_traceBlockByHash` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    #[serde(default)]
    pub tx_hash: Option<B256>,
    pub result: TraceFrame,
}

/// EIP-55 checksummed rendering of an address.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}
