//! Composite big-endian byte keys.
//!
//! Every chain-scoped tree keys rows with a `chainId (8 BE)` prefix followed
//! by block number / index components, so ascending byte order equals
//! ascending `(chain, block, index)` order and range scans stay cheap.

use alloy_primitives::{Address, B256};

pub(crate) fn chain_prefix(chain_id: u64) -> [u8; 8] {
    chain_id.to_be_bytes()
}

pub(crate) fn block_key(chain_id: u64, number: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..].copy_from_slice(&number.to_be_bytes());
    key
}

pub(crate) fn block_hash_key(chain_id: u64, hash: &B256) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..].copy_from_slice(hash.as_slice());
    key
}

/// `(chain, block, index)` key of logs, transactions, and receipts.
pub(crate) fn row_key(chain_id: u64, block_number: u64, index: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..16].copy_from_slice(&block_number.to_be_bytes());
    key[16..].copy_from_slice(&index.to_be_bytes());
    key
}

/// `(chain, block, txIndex, traceIndex)` key of traces.
pub(crate) fn trace_key(
    chain_id: u64,
    block_number: u64,
    transaction_index: u64,
    trace_index: u64,
) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..16].copy_from_slice(&block_number.to_be_bytes());
    key[16..24].copy_from_slice(&transaction_index.to_be_bytes());
    key[24..].copy_from_slice(&trace_index.to_be_bytes());
    key
}

/// `(chain, block)` prefix selecting every row of one block.
pub(crate) fn block_prefix(chain_id: u64, block_number: u64) -> [u8; 16] {
    block_key(chain_id, block_number)
}

/// `(chain, factoryId, address)` key of factory children. The factory id is
/// NUL-terminated so ids that prefix each other cannot collide.
pub(crate) fn factory_address_key(chain_id: u64, factory_id: &str, address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + factory_id.len() + 1 + 20);
    key.extend_from_slice(&chain_id.to_be_bytes());
    key.extend_from_slice(factory_id.as_bytes());
    key.push(0);
    key.extend_from_slice(address.as_slice());
    key
}

/// Prefix selecting every child of one factory.
pub(crate) fn factory_prefix(chain_id: u64, factory_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + factory_id.len() + 1);
    key.extend_from_slice(&chain_id.to_be_bytes());
    key.extend_from_slice(factory_id.as_bytes());
    key.push(0);
    key
}

/// Address component of a factory-children key.
pub(crate) fn factory_key_address(key: &[u8]) -> Option<Address> {
    (key.len() >= 20).then(|| Address::from_slice(&key[key.len() - 20..]))
}

/// `(chain, requestHash)` key of the RPC response cache.
pub(crate) fn rpc_cache_key(chain_id: u64, request_hash: [u8; 16]) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..].copy_from_slice(&request_hash);
    key
}

/// `(chain, block, requestHash)` key of the cache-by-block index.
pub(crate) fn rpc_cache_block_key(
    chain_id: u64,
    block_number: u64,
    request_hash: [u8; 16],
) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&chain_id.to_be_bytes());
    key[8..16].copy_from_slice(&block_number.to_be_bytes());
    key[16..].copy_from_slice(&request_hash);
    key
}

/// Block-number component of a `(chain, block, ...)` key.
pub(crate) fn key_block_number(key: &[u8]) -> Option<u64> {
    key.get(8..16)
        .map(|bytes| u64::from_be_bytes(bytes.try_into().expect("8-byte slice")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_keys_order_by_block_then_index() {
        let a = row_key(1, 100, 5);
        let b = row_key(1, 100, 6);
        let c = row_key(1, 101, 0);
        let d = row_key(2, 0, 0);
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn test_factory_keys_do_not_collide_on_prefix_ids() {
        let address = Address::repeat_byte(1);
        let a = factory_address_key(1, "factory_1_0xaa", &address);
        let b = factory_address_key(1, "factory_1_0xaabb", &address);
        assert_ne!(a, b);
        assert!(a.starts_with(&factory_prefix(1, "factory_1_0xaa")));
        assert!(!b.starts_with(&factory_prefix(1, "factory_1_0xaa")));
    }

    #[test]
    fn test_key_block_number_extraction() {
        assert_eq!(key_block_number(&row_key(1, 42, 7)), Some(42));
        assert_eq!(key_block_number(&block_key(1, 42)), Some(42));
        assert_eq!(key_block_number(&[0u8; 4]), None);
    }
}
