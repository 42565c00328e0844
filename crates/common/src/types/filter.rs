//! Canonical event-source filters and their matching rules.
//!
//! Filters describe which on-chain events a source cares about. Matching
//! comes in two strengths: *weak* matching ignores factory child-address
//! knowledge (used before child sets are loaded), full matching consults
//! the factory's `childAddress -> firstSeenBlock` map.

use std::collections::HashMap;

use alloy_primitives::{Address, Bloom, BloomInput, FixedBytes, B256};
use serde::{Deserialize, Serialize};

use super::rpc;

/// A 4-byte function selector.
pub type Selector = FixedBytes<4>;

/// Map of factory child addresses to the first block they appeared in.
pub type ChildAddresses = HashMap<Address, u64>;

/// Where a factory log encodes the child address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildLocation {
    /// Last 20 bytes of `topics[1]`.
    Topic1,
    /// Last 20 bytes of `topics[2]`.
    Topic2,
    /// Last 20 bytes of `topics[3]`.
    Topic3,
    /// Last 20 bytes of the 32-byte word at this byte offset of `data`.
    Offset(usize),
}

impl ChildLocation {
    /// Canonical textual form used inside factory ids.
    pub fn as_label(&self) -> String {
        match self {
            ChildLocation::Topic1 => "topic1".to_owned(),
            ChildLocation::Topic2 => "topic2".to_owned(),
            ChildLocation::Topic3 => "topic3".to_owned(),
            ChildLocation::Offset(n) => format!("offset{n}"),
        }
    }
}

/// A log-derived factory producing child addresses for other filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFactory {
    pub chain_id: u64,
    /// Factory contract address(es) emitting the creation event.
    pub addresses: Vec<Address>,
    /// `topic0` of the creation event.
    pub event_selector: B256,
    /// Where the child address lives in the creation log.
    pub child_location: ChildLocation,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl LogFactory {
    /// Stable textual id; identical factories share it.
    pub fn id(&self) -> String {
        let mut addresses: Vec<String> = self
            .addresses
            .iter()
            .map(|a| format!("{a:#x}"))
            .collect();
        addresses.sort_unstable();
        format!(
            "factory_{}_{}_{:#x}_{}",
            self.chain_id,
            addresses.join("+"),
            self.event_selector,
            self.child_location.as_label(),
        )
    }

    /// Extracts the child address from a creation log, if well-formed.
    pub fn child_address(&self, log: &rpc::Log) -> Option<Address> {
        let word: &[u8] = match self.child_location {
            ChildLocation::Topic1 => log.topics.get(1)?.as_slice(),
            ChildLocation::Topic2 => log.topics.get(2)?.as_slice(),
            ChildLocation::Topic3 => log.topics.get(3)?.as_slice(),
            ChildLocation::Offset(offset) => log.data.get(offset..offset + 32)?,
        };
        Some(Address::from_slice(&word[12..32]))
    }

    /// Whether a log is a creation log of this factory.
    pub fn matches_log(&self, log: &rpc::Log) -> bool {
        self.addresses.contains(&log.address) && log.topic0() == Some(&self.event_selector)
    }
}

/// Address constraint of a filter dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressCriteria {
    /// Unconstrained.
    Any,
    /// A single literal address.
    One(Address),
    /// A set of literal addresses.
    Many(Vec<Address>),
    /// Addresses produced by a factory.
    Factory(LogFactory),
}

impl AddressCriteria {
    /// The factory behind this criteria, if any.
    pub fn factory(&self) -> Option<&LogFactory> {
        match self {
            AddressCriteria::Factory(f) => Some(f),
            _ => None,
        }
    }

    /// Full match; factory dimensions consult `children` with the rule
    /// `firstSeenBlock <= block_number`.
    pub fn matches(
        &self,
        address: &Address,
        block_number: u64,
        children: Option<&ChildAddresses>,
    ) -> bool {
        match self {
            AddressCriteria::Any => true,
            AddressCriteria::One(a) => a == address,
            AddressCriteria::Many(set) => set.contains(address),
            AddressCriteria::Factory(_) => children
                .is_some_and(|map| map.get(address).is_some_and(|first| *first <= block_number)),
        }
    }

    /// Weak match: factory dimensions pass unconditionally.
    pub fn matches_weak(&self, address: &Address) -> bool {
        match self {
            AddressCriteria::Any | AddressCriteria::Factory(_) => true,
            AddressCriteria::One(a) => a == address,
            AddressCriteria::Many(set) => set.contains(address),
        }
    }

    fn matches_bloom(&self, bloom: &Bloom) -> bool {
        match self {
            AddressCriteria::Any | AddressCriteria::Factory(_) => true,
            AddressCriteria::One(a) => bloom.contains_input(BloomInput::Raw(a.as_slice())),
            AddressCriteria::Many(set) => set
                .iter()
                .any(|a| bloom.contains_input(BloomInput::Raw(a.as_slice()))),
        }
    }
}

/// Topic constraint of one topic position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicCriteria {
    /// Unconstrained.
    Any,
    /// A single topic value.
    One(B256),
    /// Any of a set of topic values.
    OneOf(Vec<B256>),
}

impl TopicCriteria {
    fn matches(&self, topic: Option<&B256>) -> bool {
        match self {
            TopicCriteria::Any => true,
            TopicCriteria::One(t) => topic == Some(t),
            TopicCriteria::OneOf(set) => topic.is_some_and(|t| set.contains(t)),
        }
    }

    fn matches_bloom(&self, bloom: &Bloom) -> bool {
        match self {
            TopicCriteria::Any => true,
            TopicCriteria::One(t) => bloom.contains_input(BloomInput::Raw(t.as_slice())),
            TopicCriteria::OneOf(set) => set
                .iter()
                .any(|t| bloom.contains_input(BloomInput::Raw(t.as_slice()))),
        }
    }
}

/// Log event filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub chain_id: u64,
    pub address: AddressCriteria,
    pub topics: [TopicCriteria; 4],
    pub from_block: u64,
    pub to_block: Option<u64>,
    pub include_receipts: bool,
}

impl LogFilter {
    /// Full match against a log.
    pub fn matches(&self, log: &rpc::Log, children: Option<&ChildAddresses>) -> bool {
        self.in_range(log.block_number)
            && self.address.matches(&log.address, log.block_number, children)
            && self.matches_topics(log)
    }

    /// Weak match: factory address dimension passes unconditionally.
    pub fn matches_weak(&self, log: &rpc::Log) -> bool {
        self.in_range(log.block_number)
            && self.address.matches_weak(&log.address)
            && self.matches_topics(log)
    }

    fn matches_topics(&self, log: &rpc::Log) -> bool {
        self.topics
            .iter()
            .enumerate()
            .all(|(i, criteria)| criteria.matches(log.topics.get(i)))
    }

    fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.from_block && self.to_block.is_none_or(|to| block_number <= to)
    }

    /// Conservative bloom pre-check: false only when the bloom proves the
    /// block has no matching log. Factory dimensions always pass.
    pub fn matches_bloom(&self, bloom: &Bloom) -> bool {
        self.address.matches_bloom(bloom)
            && self.topics.iter().all(|t| t.matches_bloom(bloom))
    }
}

/// Call-trace event filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFilter {
    pub chain_id: u64,
    pub from_address: AddressCriteria,
    pub to_address: AddressCriteria,
    pub function_selector: Option<Selector>,
    pub call_type: Option<String>,
    pub include_reverted: bool,
    pub include_receipts: bool,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl TraceFilter {
    /// Full match against a flattened trace row.
    pub fn matches(
        &self,
        trace: &super::records::TraceRecord,
        from_children: Option<&ChildAddresses>,
        to_children: Option<&ChildAddresses>,
    ) -> bool {
        self.in_range(trace.block_number)
            && (self.include_reverted || !trace.is_reverted)
            && self
                .function_selector
                .is_none_or(|s| trace.function_selector == Some(s))
            && self
                .call_type
                .as_deref()
                .is_none_or(|c| trace.call_type == c)
            && self
                .from_address
                .matches(&trace.from, trace.block_number, from_children)
            && matches_optional_address(
                &self.to_address,
                trace.to.as_ref(),
                trace.block_number,
                to_children,
            )
    }

    /// Weak match: factory dimensions pass unconditionally.
    pub fn matches_weak(&self, trace: &super::records::TraceRecord) -> bool {
        self.in_range(trace.block_number)
            && (self.include_reverted || !trace.is_reverted)
            && self
                .function_selector
                .is_none_or(|s| trace.function_selector == Some(s))
            && self
                .call_type
                .as_deref()
                .is_none_or(|c| trace.call_type == c)
            && self.from_address.matches_weak(&trace.from)
            && matches_optional_address_weak(&self.to_address, trace.to.as_ref())
    }

    fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.from_block && self.to_block.is_none_or(|to| block_number <= to)
    }
}

/// Native-transfer event filter (value-bearing traces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFilter {
    pub chain_id: u64,
    pub from_address: AddressCriteria,
    pub to_address: AddressCriteria,
    pub include_reverted: bool,
    pub include_receipts: bool,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl TransferFilter {
    /// Full match against a flattened trace row carrying value.
    pub fn matches(
        &self,
        trace: &super::records::TraceRecord,
        from_children: Option<&ChildAddresses>,
        to_children: Option<&ChildAddresses>,
    ) -> bool {
        self.in_range(trace.block_number)
            && trace.is_transfer()
            && (self.include_reverted || !trace.is_reverted)
            && self
                .from_address
                .matches(&trace.from, trace.block_number, from_children)
            && matches_optional_address(
                &self.to_address,
                trace.to.as_ref(),
                trace.block_number,
                to_children,
            )
    }

    /// Weak match: factory dimensions pass unconditionally.
    pub fn matches_weak(&self, trace: &super::records::TraceRecord) -> bool {
        self.in_range(trace.block_number)
            && trace.is_transfer()
            && (self.include_reverted || !trace.is_reverted)
            && self.from_address.matches_weak(&trace.from)
            && matches_optional_address_weak(&self.to_address, trace.to.as_ref())
    }

    fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.from_block && self.to_block.is_none_or(|to| block_number <= to)
    }
}

/// Transaction event filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub chain_id: u64,
    pub from_address: AddressCriteria,
    pub to_address: AddressCriteria,
    pub include_reverted: bool,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl TransactionFilter {
    /// Full match against a transaction row.
    ///
    /// `reverted` comes from the receipt; `None` means unknown and only
    /// excludes when the filter excludes reverted transactions.
    pub fn matches(
        &self,
        transaction: &super::records::TransactionRecord,
        reverted: Option<bool>,
        from_children: Option<&ChildAddresses>,
        to_children: Option<&ChildAddresses>,
    ) -> bool {
        self.in_range(transaction.block_number)
            && (self.include_reverted || reverted == Some(false))
            && self.from_address.matches(
                &transaction.from,
                transaction.block_number,
                from_children,
            )
            && matches_optional_address(
                &self.to_address,
                transaction.to.as_ref(),
                transaction.block_number,
                to_children,
            )
    }

    /// Weak match: factory dimensions and reverted-ness pass.
    pub fn matches_weak(&self, transaction: &super::records::TransactionRecord) -> bool {
        self.in_range(transaction.block_number)
            && self.from_address.matches_weak(&transaction.from)
            && matches_optional_address_weak(&self.to_address, transaction.to.as_ref())
    }

    fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.from_block && self.to_block.is_none_or(|to| block_number <= to)
    }
}

fn matches_optional_address(
    criteria: &AddressCriteria,
    address: Option<&Address>,
    block_number: u64,
    children: Option<&ChildAddresses>,
) -> bool {
    match address {
        Some(a) => criteria.matches(a, block_number, children),
        None => matches!(criteria, AddressCriteria::Any),
    }
}

fn matches_optional_address_weak(criteria: &AddressCriteria, address: Option<&Address>) -> bool {
    match address {
        Some(a) => criteria.matches_weak(a),
        None => matches!(criteria, AddressCriteria::Any | AddressCriteria::Factory(_)),
    }
}

/// Block-interval filter: matches blocks where
/// `(number - offset) % interval == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFilter {
    pub chain_id: u64,
    pub interval: u64,
    pub offset: u64,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl BlockFilter {
    /// Whether a block number matches the interval pattern and range.
    pub fn matches(&self, block_number: u64) -> bool {
        self.interval != 0
            && block_number >= self.from_block
            && self.to_block.is_none_or(|to| block_number <= to)
            && block_number % self.interval == self.offset % self.interval
    }
}

/// Canonical filter variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Log(LogFilter),
    Trace(TraceFilter),
    Transfer(TransferFilter),
    Transaction(TransactionFilter),
    Block(BlockFilter),
}

impl Filter {
    /// Chain this filter applies to.
    pub fn chain_id(&self) -> u64 {
        match self {
            Filter::Log(f) => f.chain_id,
            Filter::Trace(f) => f.chain_id,
            Filter::Transfer(f) => f.chain_id,
            Filter::Transaction(f) => f.chain_id,
            Filter::Block(f) => f.chain_id,
        }
    }

    /// First block of interest.
    pub fn from_block(&self) -> u64 {
        match self {
            Filter::Log(f) => f.from_block,
            Filter::Trace(f) => f.from_block,
            Filter::Transfer(f) => f.from_block,
            Filter::Transaction(f) => f.from_block,
            Filter::Block(f) => f.from_block,
        }
    }

    /// Last block of interest, if bounded.
    pub fn to_block(&self) -> Option<u64> {
        match self {
            Filter::Log(f) => f.to_block,
            Filter::Trace(f) => f.to_block,
            Filter::Transfer(f) => f.to_block,
            Filter::Transaction(f) => f.to_block,
            Filter::Block(f) => f.to_block,
        }
    }

    /// All factories referenced by this filter's address dimensions.
    pub fn factories(&self) -> Vec<&LogFactory> {
        let criteria: Vec<&AddressCriteria> = match self {
            Filter::Log(f) => vec![&f.address],
            Filter::Trace(f) => vec![&f.from_address, &f.to_address],
            Filter::Transfer(f) => vec![&f.from_address, &f.to_address],
            Filter::Transaction(f) => vec![&f.from_address, &f.to_address],
            Filter::Block(_) => vec![],
        };
        criteria.into_iter().filter_map(|c| c.factory()).collect()
    }

    /// Whether the filter needs call traces fetched.
    pub fn requires_traces(&self) -> bool {
        matches!(self, Filter::Trace(_) | Filter::Transfer(_))
    }

    /// Whether the filter needs transaction receipts fetched.
    pub fn requires_receipts(&self) -> bool {
        match self {
            Filter::Log(f) => f.include_receipts,
            Filter::Trace(f) => f.include_receipts,
            Filter::Transfer(f) => f.include_receipts,
            // reverted-ness of a transaction is read off its receipt
            Filter::Transaction(f) => !f.include_reverted,
            Filter::Block(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> Address {
        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap()
    }

    fn make_log(address: Address, topics: Vec<B256>, block_number: u64) -> rpc::Log {
        rpc::Log {
            address,
            topics,
            data: Default::default(),
            block_number,
            block_hash: B256::repeat_byte(1),
            transaction_hash: B256::repeat_byte(2),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        }
    }

    fn make_factory() -> LogFactory {
        LogFactory {
            chain_id: 1,
            addresses: vec![Address::repeat_byte(0xaa)],
            event_selector: B256::repeat_byte(0x11),
            child_location: ChildLocation::Topic1,
            from_block: 0,
            to_block: None,
        }
    }

    #[test]
    fn test_log_filter_address_and_topics() {
        let transfer_topic = B256::repeat_byte(0x22);
        let filter = LogFilter {
            chain_id: 1,
            address: AddressCriteria::One(usdc()),
            topics: [
                TopicCriteria::One(transfer_topic),
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block: 100,
            to_block: Some(200),
            include_receipts: false,
        };

        assert!(filter.matches(&make_log(usdc(), vec![transfer_topic], 150), None));
        assert!(!filter.matches(&make_log(usdc(), vec![transfer_topic], 99), None));
        assert!(!filter.matches(&make_log(usdc(), vec![transfer_topic], 201), None));
        assert!(!filter.matches(&make_log(usdc(), vec![B256::ZERO], 150), None));
        assert!(!filter.matches(
            &make_log(Address::repeat_byte(9), vec![transfer_topic], 150),
            None
        ));
    }

    #[test]
    fn test_factory_matching_requires_first_seen_bound() {
        let factory = make_factory();
        let child = Address::repeat_byte(0xcc);
        let filter = LogFilter {
            chain_id: 1,
            address: AddressCriteria::Factory(factory),
            topics: [
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block: 0,
            to_block: None,
            include_receipts: false,
        };

        let mut children = ChildAddresses::new();
        children.insert(child, 120);

        let log = make_log(child, vec![], 150);
        assert!(filter.matches(&log, Some(&children)));
        // child only exists from block 120 onward
        assert!(!filter.matches(&make_log(child, vec![], 110), Some(&children)));
        // no child knowledge at all
        assert!(!filter.matches(&log, None));
        // weak matching ignores the factory dimension
        assert!(filter.matches_weak(&make_log(child, vec![], 110)));
    }

    #[test]
    fn test_child_address_extraction() {
        let factory = make_factory();
        let child = Address::repeat_byte(0xcd);
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(child.as_slice());

        let log = make_log(
            Address::repeat_byte(0xaa),
            vec![factory.event_selector, B256::from(word)],
            10,
        );
        assert!(factory.matches_log(&log));
        assert_eq!(factory.child_address(&log), Some(child));

        // data-offset variant
        let mut offset_factory = make_factory();
        offset_factory.child_location = ChildLocation::Offset(32);
        let mut data = vec![0u8; 64];
        data[44..64].copy_from_slice(child.as_slice());
        let mut data_log = make_log(Address::repeat_byte(0xaa), vec![offset_factory.event_selector], 10);
        data_log.data = data.into();
        assert_eq!(offset_factory.child_address(&data_log), Some(child));

        // truncated data yields no child
        let truncated = make_log(Address::repeat_byte(0xaa), vec![offset_factory.event_selector], 10);
        assert_eq!(offset_factory.child_address(&truncated), None);
    }

    #[test]
    fn test_block_filter_modulo() {
        let filter = BlockFilter {
            chain_id: 1,
            interval: 10,
            offset: 3,
            from_block: 0,
            to_block: None,
        };
        assert!(filter.matches(3));
        assert!(filter.matches(13));
        assert!(!filter.matches(10));

        let degenerate = BlockFilter { interval: 0, ..filter };
        assert!(!degenerate.matches(3));
    }

    #[test]
    fn test_bloom_precheck_conservative() {
        let mut bloom = Bloom::default();
        bloom.accrue(BloomInput::Raw(usdc().as_slice()));

        let matching = LogFilter {
            chain_id: 1,
            address: AddressCriteria::One(usdc()),
            topics: [
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block: 0,
            to_block: None,
            include_receipts: false,
        };
        assert!(matching.matches_bloom(&bloom));

        let missing = LogFilter {
            address: AddressCriteria::One(Address::repeat_byte(0x77)),
            ..matching.clone()
        };
        assert!(!missing.matches_bloom(&bloom));

        // factory dimension can never be excluded by the bloom
        let factory = LogFilter {
            address: AddressCriteria::Factory(make_factory()),
            ..matching
        };
        assert!(factory.matches_bloom(&bloom));
    }

    #[test]
    fn test_factory_id_is_stable() {
        let a = make_factory();
        let mut b = make_factory();
        assert_eq!(a.id(), b.id());
        b.child_location = ChildLocation::Offset(64);
        assert_ne!(a.id(), b.id());
    }
}
