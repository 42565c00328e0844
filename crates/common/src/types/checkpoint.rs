//! Totally-ordered event coordinates.
//!
//! A checkpoint uniquely locates an event across every chain. The encoded
//! form uses fixed-width zero-padded decimal fields so lexicographic string
//! comparison agrees with semantic comparison.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field widths of the encoded form, in decimal digits.
const TIMESTAMP_DIGITS: usize = 10;
const CHAIN_ID_DIGITS: usize = 16;
const BLOCK_NUMBER_DIGITS: usize = 16;
const TRANSACTION_INDEX_DIGITS: usize = 16;
const EVENT_TYPE_DIGITS: usize = 1;
const EVENT_INDEX_DIGITS: usize = 16;

/// Total length of an encoded checkpoint string.
pub const ENCODED_LEN: usize = TIMESTAMP_DIGITS
    + CHAIN_ID_DIGITS
    + BLOCK_NUMBER_DIGITS
    + TRANSACTION_INDEX_DIGITS
    + EVENT_TYPE_DIGITS
    + EVENT_INDEX_DIGITS;

/// Kind of event a checkpoint points at.
///
/// Codes are strictly ordered within a block; mutually-exclusive variants
/// share a code (a transfer *is* a trace, and block events never collide
/// with log events at the same `(transactionIndex, eventIndex)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Transaction-level event.
    Transaction,
    /// Block-interval event.
    Block,
    /// Log event.
    Log,
    /// Call-trace event.
    Trace,
    /// Native transfer event (derived from a trace).
    Transfer,
}

impl EventKind {
    /// One-digit order code used in the encoded checkpoint.
    pub fn code(self) -> u8 {
        match self {
            EventKind::Transaction => 2,
            EventKind::Block | EventKind::Log => 5,
            EventKind::Trace | EventKind::Transfer => 7,
        }
    }
}

/// Totally-ordered event coordinate.
///
/// Field order is the comparison order; the derived `Ord` is the semantic
/// order and [`Checkpoint::encode`] preserves it lexicographically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Checkpoint {
    /// Unix timestamp of the containing block.
    pub block_timestamp: u64,
    /// Chain id.
    pub chain_id: u64,
    /// Block number.
    pub block_number: u64,
    /// Transaction index within the block.
    pub transaction_index: u64,
    /// Event-kind order code (see [`EventKind::code`]).
    pub event_type: u8,
    /// Event index within `(transaction, event type)`.
    pub event_index: u64,
}

/// Errors produced while decoding a checkpoint string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckpointDecodeError {
    /// The string is not exactly [`ENCODED_LEN`] characters.
    #[error("invalid checkpoint length: expected {ENCODED_LEN}, got {0}")]
    InvalidLength(usize),

    /// A field was not parseable as decimal.
    #[error("invalid checkpoint field {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending substring.
        value: String,
    },
}

impl Checkpoint {
    /// The minimum checkpoint (all zeros).
    pub const ZERO: Checkpoint = Checkpoint {
        block_timestamp: 0,
        chain_id: 0,
        block_number: 0,
        transaction_index: 0,
        event_type: 0,
        event_index: 0,
    };

    /// The maximum checkpoint (all nines in the encoded form).
    pub const MAX: Checkpoint = Checkpoint {
        block_timestamp: 9_999_999_999,
        chain_id: 9_999_999_999_999_999,
        block_number: 9_999_999_999_999_999,
        transaction_index: 9_999_999_999_999_999,
        event_type: 9,
        event_index: 9_999_999_999_999_999,
    };

    /// The smallest checkpoint inside `(chain_id, block)`, used as a block
    /// lower bound.
    pub fn block_start(block_timestamp: u64, chain_id: u64, block_number: u64) -> Self {
        Checkpoint {
            block_timestamp,
            chain_id,
            block_number,
            ..Checkpoint::ZERO
        }
    }

    /// The largest checkpoint inside `(chain_id, block)`, used as a block
    /// upper bound.
    pub fn block_end(block_timestamp: u64, chain_id: u64, block_number: u64) -> Self {
        Checkpoint {
            block_timestamp,
            chain_id,
            block_number,
            transaction_index: Checkpoint::MAX.transaction_index,
            event_type: Checkpoint::MAX.event_type,
            event_index: Checkpoint::MAX.event_index,
        }
    }

    /// Encodes to the fixed-width decimal form.
    pub fn encode(&self) -> String {
        format!(
            "{:0tw$}{:0cw$}{:0bw$}{:0xw$}{:0ew$}{:0iw$}",
            self.block_timestamp,
            self.chain_id,
            self.block_number,
            self.transaction_index,
            self.event_type,
            self.event_index,
            tw = TIMESTAMP_DIGITS,
            cw = CHAIN_ID_DIGITS,
            bw = BLOCK_NUMBER_DIGITS,
            xw = TRANSACTION_INDEX_DIGITS,
            ew = EVENT_TYPE_DIGITS,
            iw = EVENT_INDEX_DIGITS,
        )
    }

    /// Decodes a fixed-width decimal form produced by [`Checkpoint::encode`].
    pub fn decode(encoded: &str) -> Result<Self, CheckpointDecodeError> {
        if encoded.len() != ENCODED_LEN || !encoded.is_ascii() {
            return Err(CheckpointDecodeError::InvalidLength(encoded.len()));
        }

        fn field<T: std::str::FromStr>(
            s: &str,
            name: &'static str,
        ) -> Result<T, CheckpointDecodeError> {
            s.parse().map_err(|_| CheckpointDecodeError::InvalidField {
                field: name,
                value: s.to_owned(),
            })
        }

        let (timestamp, rest) = encoded.split_at(TIMESTAMP_DIGITS);
        let (chain_id, rest) = rest.split_at(CHAIN_ID_DIGITS);
        let (block_number, rest) = rest.split_at(BLOCK_NUMBER_DIGITS);
        let (transaction_index, rest) = rest.split_at(TRANSACTION_INDEX_DIGITS);
        let (event_type, event_index) = rest.split_at(EVENT_TYPE_DIGITS);

        Ok(Checkpoint {
            block_timestamp: field(timestamp, "block_timestamp")?,
            chain_id: field(chain_id, "chain_id")?,
            block_number: field(block_number, "block_number")?,
            transaction_index: field(transaction_index, "transaction_index")?,
            event_type: field(event_type, "event_type")?,
            event_index: field(event_index, "event_index")?,
        })
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn make(ts: u64, chain: u64, block: u64, tx: u64, kind: EventKind, idx: u64) -> Checkpoint {
        Checkpoint {
            block_timestamp: ts,
            chain_id: chain,
            block_number: block,
            transaction_index: tx,
            event_type: kind.code(),
            event_index: idx,
        }
    }

    #[test]
    fn test_encoded_length() {
        assert_eq!(Checkpoint::ZERO.encode().len(), ENCODED_LEN);
        assert_eq!(Checkpoint::MAX.encode().len(), ENCODED_LEN);
        assert_eq!(Checkpoint::ZERO.encode(), "0".repeat(ENCODED_LEN));
        assert_eq!(Checkpoint::MAX.encode(), "9".repeat(ENCODED_LEN));
    }

    #[test]
    fn test_roundtrip() {
        let cp = make(1673397071, 137, 16369955, 3, EventKind::Log, 12);
        assert_eq!(Checkpoint::decode(&cp.encode()), Ok(cp));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Checkpoint::decode("short"),
            Err(CheckpointDecodeError::InvalidLength(5))
        ));
        let mut bad = Checkpoint::ZERO.encode();
        bad.replace_range(0..1, "x");
        assert!(matches!(
            Checkpoint::decode(&bad),
            Err(CheckpointDecodeError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_timestamp_dominates_chain_order() {
        // chain 1 at ts 1000 sorts before chain 137 at ts 1001, and also
        // before chain 0 at ts 1001
        let a = make(1000, 1, 100, 0, EventKind::Log, 0);
        let b = make(1001, 137, 50, 0, EventKind::Log, 0);
        let c = make(1001, 0, 50, 0, EventKind::Log, 0);
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn test_event_kind_order_within_block() {
        let tx = make(1000, 1, 100, 2, EventKind::Transaction, 0);
        let log = make(1000, 1, 100, 2, EventKind::Log, 0);
        let trace = make(1000, 1, 100, 2, EventKind::Trace, 0);
        assert!(tx < log);
        assert!(log < trace);
        // transfers share the trace code, blocks share the log code
        assert_eq!(EventKind::Transfer.code(), EventKind::Trace.code());
        assert_eq!(EventKind::Block.code(), EventKind::Log.code());
    }

    #[test]
    fn test_block_bounds() {
        let lo = Checkpoint::block_start(1000, 1, 100);
        let hi = Checkpoint::block_end(1000, 1, 100);
        let inside = make(1000, 1, 100, 7, EventKind::Trace, 3);
        assert!(lo <= inside && inside <= hi);
        assert!(hi < Checkpoint::block_start(1000, 1, 101));
    }

    proptest! {
        #[test]
        fn prop_lexicographic_equals_semantic(
            a_ts in 0u64..9_999_999_999, a_chain in 0u64..1_000_000, a_block in 0u64..u32::MAX as u64,
            a_tx in 0u64..100_000, a_type in 0u8..10, a_idx in 0u64..1_000_000,
            b_ts in 0u64..9_999_999_999, b_chain in 0u64..1_000_000, b_block in 0u64..u32::MAX as u64,
            b_tx in 0u64..100_000, b_type in 0u8..10, b_idx in 0u64..1_000_000,
        ) {
            let a = Checkpoint {
                block_timestamp: a_ts, chain_id: a_chain, block_number: a_block,
                transaction_index: a_tx, event_type: a_type, event_index: a_idx,
            };
            let b = Checkpoint {
                block_timestamp: b_ts, chain_id: b_chain, block_number: b_block,
                transaction_index: b_tx, event_type: b_type, event_index: b_idx,
            };
            prop_assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));
        }

        #[test]
        fn prop_roundtrip(
            ts in 0u64..9_999_999_999, chain in 0u64..u32::MAX as u64,
            block in 0u64..9_999_999_999_999_999, tx in 0u64..1_000_000,
            ty in 0u8..10, idx in 0u64..1_000_000,
        ) {
            let cp = Checkpoint {
                block_timestamp: ts, chain_id: chain, block_number: block,
                transaction_index: tx, event_type: ty, event_index: idx,
            };
            prop_assert_eq!(Checkpoint::decode(&cp.encode()), Ok(cp));
        }
    }
}
