//! Filter fragments: the minimal independently-cacheable filter slices.
//!
//! A fragment's textual id is the interval-ledger key. A stored fragment
//! satisfies a query fragment iff the stored id is in the query's *adjacent
//! set* — the query's own id plus the ids of every strict generalization
//! (wildcard address/topic, `includeReceipts = 1` covering `0`, and
//! `includeReverted = 1` covering `0`).

use alloy_primitives::{Address, B256};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::filter::{AddressCriteria, Filter, Selector, TopicCriteria};

/// Address position of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FragmentAddress {
    /// Wildcard.
    Any,
    /// A literal address.
    Literal(Address),
    /// Child addresses of a factory, keyed by factory id.
    Factory(String),
}

impl FragmentAddress {
    fn label(&self) -> String {
        match self {
            FragmentAddress::Any => "null".to_owned(),
            FragmentAddress::Literal(a) => format!("{a:#x}"),
            FragmentAddress::Factory(id) => id.clone(),
        }
    }

    /// The stored labels that cover this query position.
    fn covering_labels(&self) -> Vec<String> {
        match self {
            FragmentAddress::Any => vec!["null".to_owned()],
            _ => vec![self.label(), "null".to_owned()],
        }
    }
}

fn topic_label(topic: &Option<B256>) -> String {
    match topic {
        Some(t) => format!("{t:#x}"),
        None => "null".to_owned(),
    }
}

fn topic_covering_labels(topic: &Option<B256>) -> Vec<String> {
    match topic {
        Some(_) => vec![topic_label(topic), "null".to_owned()],
        None => vec!["null".to_owned()],
    }
}

fn flag_label(flag: bool) -> String {
    if flag { "1" } else { "0" }.to_owned()
}

/// The stored flag values covering a query flag (`1` covers `0`).
fn flag_covering_labels(flag: bool) -> Vec<String> {
    if flag {
        vec!["1".to_owned()]
    } else {
        vec!["0".to_owned(), "1".to_owned()]
    }
}

fn option_label<T: std::fmt::LowerHex>(value: &Option<T>) -> String {
    match value {
        Some(v) => format!("{v:#x}"),
        None => "null".to_owned(),
    }
}

fn option_covering_labels<T: std::fmt::LowerHex>(value: &Option<T>) -> Vec<String> {
    match value {
        Some(_) => vec![option_label(value), "null".to_owned()],
        None => vec!["null".to_owned()],
    }
}

fn string_covering_labels(value: &Option<String>) -> Vec<String> {
    match value {
        Some(v) => vec![v.clone(), "null".to_owned()],
        None => vec!["null".to_owned()],
    }
}

/// A log fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFragment {
    pub chain_id: u64,
    pub address: FragmentAddress,
    pub topic0: Option<B256>,
    pub topic1: Option<B256>,
    pub topic2: Option<B256>,
    pub topic3: Option<B256>,
    pub include_receipts: bool,
}

/// A call-trace fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceFragment {
    pub chain_id: u64,
    pub from: FragmentAddress,
    pub to: FragmentAddress,
    pub function_selector: Option<Selector>,
    pub call_type: Option<String>,
    pub include_reverted: bool,
    pub include_receipts: bool,
}

/// A native-transfer fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferFragment {
    pub chain_id: u64,
    pub from: FragmentAddress,
    pub to: FragmentAddress,
    pub include_reverted: bool,
    pub include_receipts: bool,
}

/// A transaction fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionFragment {
    pub chain_id: u64,
    pub from: FragmentAddress,
    pub to: FragmentAddress,
    pub include_reverted: bool,
}

/// A block-interval fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockFragment {
    pub chain_id: u64,
    pub interval: u64,
    pub offset: u64,
}

/// A minimal cacheable filter slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fragment {
    Log(LogFragment),
    Trace(TraceFragment),
    Transfer(TransferFragment),
    Transaction(TransactionFragment),
    Block(BlockFragment),
}

impl Fragment {
    /// Canonical textual id; semantically identical fragments share it.
    pub fn id(&self) -> String {
        match self {
            Fragment::Log(f) => format!(
                "log_{}_{}_{}_{}_{}_{}_{}",
                f.chain_id,
                f.address.label(),
                topic_label(&f.topic0),
                topic_label(&f.topic1),
                topic_label(&f.topic2),
                topic_label(&f.topic3),
                flag_label(f.include_receipts),
            ),
            Fragment::Trace(f) => format!(
                "trace_{}_{}_{}_{}_{}_{}_{}",
                f.chain_id,
                f.from.label(),
                f.to.label(),
                option_label(&f.function_selector),
                f.call_type.clone().unwrap_or_else(|| "null".to_owned()),
                flag_label(f.include_reverted),
                flag_label(f.include_receipts),
            ),
            Fragment::Transfer(f) => format!(
                "transfer_{}_{}_{}_{}_{}",
                f.chain_id,
                f.from.label(),
                f.to.label(),
                flag_label(f.include_reverted),
                flag_label(f.include_receipts),
            ),
            Fragment::Transaction(f) => format!(
                "transaction_{}_{}_{}_{}",
                f.chain_id,
                f.from.label(),
                f.to.label(),
                flag_label(f.include_reverted),
            ),
            Fragment::Block(f) => format!("block_{}_{}_{}", f.chain_id, f.interval, f.offset),
        }
    }

    /// The ids of every stored fragment that satisfies this query fragment
    /// (this fragment's id plus all strict generalizations).
    pub fn adjacent_ids(&self) -> Vec<String> {
        match self {
            Fragment::Log(f) => {
                let dims = vec![
                    f.address.covering_labels(),
                    topic_covering_labels(&f.topic0),
                    topic_covering_labels(&f.topic1),
                    topic_covering_labels(&f.topic2),
                    topic_covering_labels(&f.topic3),
                    flag_covering_labels(f.include_receipts),
                ];
                product_ids(&format!("log_{}", f.chain_id), dims)
            }
            Fragment::Trace(f) => {
                let dims = vec![
                    f.from.covering_labels(),
                    f.to.covering_labels(),
                    option_covering_labels(&f.function_selector),
                    string_covering_labels(&f.call_type),
                    flag_covering_labels(f.include_reverted),
                    flag_covering_labels(f.include_receipts),
                ];
                product_ids(&format!("trace_{}", f.chain_id), dims)
            }
            Fragment::Transfer(f) => {
                let dims = vec![
                    f.from.covering_labels(),
                    f.to.covering_labels(),
                    flag_covering_labels(f.include_reverted),
                    flag_covering_labels(f.include_receipts),
                ];
                product_ids(&format!("transfer_{}", f.chain_id), dims)
            }
            Fragment::Transaction(f) => {
                let dims = vec![
                    f.from.covering_labels(),
                    f.to.covering_labels(),
                    flag_covering_labels(f.include_reverted),
                ];
                product_ids(&format!("transaction_{}", f.chain_id), dims)
            }
            // a block fragment is only covered by itself
            Fragment::Block(_) => vec![self.id()],
        }
    }
}

fn product_ids(prefix: &str, dims: Vec<Vec<String>>) -> Vec<String> {
    dims.into_iter()
        .multi_cartesian_product()
        .map(|parts| format!("{prefix}_{}", parts.join("_")))
        .collect()
}

fn address_positions(criteria: &AddressCriteria) -> Vec<FragmentAddress> {
    match criteria {
        AddressCriteria::Any => vec![FragmentAddress::Any],
        AddressCriteria::One(a) => vec![FragmentAddress::Literal(*a)],
        AddressCriteria::Many(set) => set
            .iter()
            .copied()
            .map(FragmentAddress::Literal)
            .unique()
            .collect(),
        AddressCriteria::Factory(f) => vec![FragmentAddress::Factory(f.id())],
    }
}

fn topic_positions(criteria: &TopicCriteria) -> Vec<Option<B256>> {
    match criteria {
        TopicCriteria::Any => vec![None],
        TopicCriteria::One(t) => vec![Some(*t)],
        TopicCriteria::OneOf(set) => set.iter().copied().map(Some).unique().collect(),
    }
}

/// Decomposes a filter into the fragments spanning it (cross-product over
/// address sets and topic lists).
pub fn fragments(filter: &Filter) -> Vec<Fragment> {
    match filter {
        Filter::Log(f) => {
            let mut out = Vec::new();
            for address in address_positions(&f.address) {
                for topic0 in topic_positions(&f.topics[0]) {
                    for topic1 in topic_positions(&f.topics[1]) {
                        for topic2 in topic_positions(&f.topics[2]) {
                            for topic3 in topic_positions(&f.topics[3]) {
                                out.push(Fragment::Log(LogFragment {
                                    chain_id: f.chain_id,
                                    address: address.clone(),
                                    topic0,
                                    topic1,
                                    topic2,
                                    topic3,
                                    include_receipts: f.include_receipts,
                                }));
                            }
                        }
                    }
                }
            }
            out
        }
        Filter::Trace(f) => {
            let mut out = Vec::new();
            for from in address_positions(&f.from_address) {
                for to in address_positions(&f.to_address) {
                    out.push(Fragment::Trace(TraceFragment {
                        chain_id: f.chain_id,
                        from: from.clone(),
                        to,
                        function_selector: f.function_selector,
                        call_type: f.call_type.clone(),
                        include_reverted: f.include_reverted,
                        include_receipts: f.include_receipts,
                    }));
                }
            }
            out
        }
        Filter::Transfer(f) => {
            let mut out = Vec::new();
            for from in address_positions(&f.from_address) {
                for to in address_positions(&f.to_address) {
                    out.push(Fragment::Transfer(TransferFragment {
                        chain_id: f.chain_id,
                        from: from.clone(),
                        to,
                        include_reverted: f.include_reverted,
                        include_receipts: f.include_receipts,
                    }));
                }
            }
            out
        }
        Filter::Transaction(f) => {
            let mut out = Vec::new();
            for from in address_positions(&f.from_address) {
                for to in address_positions(&f.to_address) {
                    out.push(Fragment::Transaction(TransactionFragment {
                        chain_id: f.chain_id,
                        from: from.clone(),
                        to,
                        include_reverted: f.include_reverted,
                    }));
                }
            }
            out
        }
        Filter::Block(f) => vec![Fragment::Block(BlockFragment {
            chain_id: f.chain_id,
            interval: f.interval,
            offset: f.offset,
        })],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::filter::{BlockFilter, LogFilter};

    fn make_log_filter(address: AddressCriteria, topic0: TopicCriteria) -> Filter {
        Filter::Log(LogFilter {
            chain_id: 1,
            address,
            topics: [
                topic0,
                TopicCriteria::Any,
                TopicCriteria::Any,
                TopicCriteria::Any,
            ],
            from_block: 0,
            to_block: None,
            include_receipts: false,
        })
    }

    #[test]
    fn test_log_fragment_id_shape() {
        let address: Address = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap();
        let filter = make_log_filter(AddressCriteria::One(address), TopicCriteria::Any);
        let frags = fragments(&filter);
        assert_eq!(frags.len(), 1);
        assert_eq!(
            frags[0].id(),
            "log_1_0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48_null_null_null_null_0"
        );
    }

    #[test]
    fn test_address_list_decomposes_per_address() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let filter = make_log_filter(AddressCriteria::Many(vec![a, b]), TopicCriteria::Any);
        let frags = fragments(&filter);
        assert_eq!(frags.len(), 2);
        assert_ne!(frags[0].id(), frags[1].id());
    }

    #[test]
    fn test_topic_list_decomposes_per_topic() {
        let filter = make_log_filter(
            AddressCriteria::Any,
            TopicCriteria::OneOf(vec![B256::repeat_byte(1), B256::repeat_byte(2)]),
        );
        assert_eq!(fragments(&filter).len(), 2);
    }

    #[test]
    fn test_identical_fragments_share_ids() {
        let filter_a = make_log_filter(AddressCriteria::Any, TopicCriteria::One(B256::repeat_byte(7)));
        let filter_b = make_log_filter(AddressCriteria::Any, TopicCriteria::One(B256::repeat_byte(7)));
        assert_eq!(fragments(&filter_a)[0].id(), fragments(&filter_b)[0].id());
    }

    #[test]
    fn test_adjacency_contains_self_and_wildcards() {
        let address = Address::repeat_byte(3);
        let filter = make_log_filter(
            AddressCriteria::One(address),
            TopicCriteria::One(B256::repeat_byte(7)),
        );
        let fragment = &fragments(&filter)[0];
        let adjacent = fragment.adjacent_ids();

        // address x topic0 x receipts generalize: 2 * 2 * 2 = 8
        assert_eq!(adjacent.len(), 8);
        assert!(adjacent.contains(&fragment.id()));
        // the fully wildcarded row covers this query
        assert!(adjacent.contains(&"log_1_null_null_null_null_null_1".to_owned()));

        // a receipts=1 query is NOT covered by a receipts=0 row
        let with_receipts = Fragment::Log(LogFragment {
            chain_id: 1,
            address: FragmentAddress::Literal(address),
            topic0: None,
            topic1: None,
            topic2: None,
            topic3: None,
            include_receipts: true,
        });
        assert!(with_receipts
            .adjacent_ids()
            .iter()
            .all(|id| id.ends_with("_1")));
    }

    #[test]
    fn test_block_fragment_is_self_adjacent_only() {
        let filter = Filter::Block(BlockFilter {
            chain_id: 1,
            interval: 10,
            offset: 3,
            from_block: 0,
            to_block: None,
        });
        let frags = fragments(&filter);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].id(), "block_1_10_3");
        assert_eq!(frags[0].adjacent_ids(), vec!["block_1_10_3".to_owned()]);
    }
}
