//! Mutable realtime syncer state.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::Address;
use eventide_common::{types::filter::ChildAddresses, LightBlock};

use crate::local_chain::LocalChain;

/// How receipts are fetched; once the block-level call fails the syncer
/// latches to per-transaction fetches for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiptsMode {
    Block,
    PerTransaction,
}

/// Per-block child-address delta, kept for reorg rollback until finalized.
type ChildDelta = Vec<(String, Address)>;

#[derive(Debug)]
pub(crate) struct RealtimeState {
    pub chain: LocalChain,
    /// Live factory-id keyed child sets (store view + unfinalized deltas).
    pub children: HashMap<String, ChildAddresses>,
    pub receipts_mode: ReceiptsMode,
    child_deltas: BTreeMap<u64, ChildDelta>,
}

impl RealtimeState {
    /// Creates state rooted at the finalized block, with child sets seeded
    /// from the store.
    pub(crate) fn new(
        finalized: LightBlock,
        children: HashMap<String, ChildAddresses>,
    ) -> Self {
        Self {
            chain: LocalChain::new(finalized),
            children,
            receipts_mode: ReceiptsMode::Block,
            child_deltas: BTreeMap::new(),
        }
    }

    /// Records children discovered in a block; returns the addresses that
    /// are genuinely new (first sighting).
    pub(crate) fn record_children(
        &mut self,
        block_number: u64,
        factory_id: &str,
        addresses: impl IntoIterator<Item = Address>,
    ) -> Vec<Address> {
        let set = self.children.entry(factory_id.to_owned()).or_default();
        let mut fresh = Vec::new();
        for address in addresses {
            if set.contains_key(&address) {
                continue;
            }
            set.insert(address, block_number);
            fresh.push(address);
            self.child_deltas
                .entry(block_number)
                .or_default()
                .push((factory_id.to_owned(), address));
        }
        fresh
    }

    /// Undoes child discoveries above the reorg ancestor.
    pub(crate) fn rollback_children_above(&mut self, ancestor: u64) {
        let rolled: Vec<ChildDelta> = self
            .child_deltas
            .split_off(&(ancestor + 1))
            .into_values()
            .collect();
        for delta in rolled {
            for (factory_id, address) in delta {
                if let Some(set) = self.children.get_mut(&factory_id) {
                    set.remove(&address);
                }
            }
        }
    }

    /// Drains deltas at or below the new finalized block; they are now
    /// owned by the store.
    pub(crate) fn finalize_children(
        &mut self,
        finalized: u64,
    ) -> HashMap<String, ChildAddresses> {
        let mut keep = self.child_deltas.split_off(&(finalized + 1));
        std::mem::swap(&mut keep, &mut self.child_deltas);
        // `keep` now holds the finalized deltas
        let mut out: HashMap<String, ChildAddresses> = HashMap::new();
        for (block_number, delta) in keep {
            for (factory_id, address) in delta {
                out.entry(factory_id).or_default().insert(address, block_number);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use eventide_common::LightBlock;

    use super::*;

    fn make_state() -> RealtimeState {
        RealtimeState::new(
            LightBlock {
                hash: Default::default(),
                parent_hash: Default::default(),
                number: 100,
                timestamp: 1000,
            },
            HashMap::new(),
        )
    }

    #[test]
    fn test_record_children_keeps_first_sighting() {
        let mut state = make_state();
        let address = Address::repeat_byte(1);

        let fresh = state.record_children(101, "factory_a", [address]);
        assert_eq!(fresh, vec![address]);
        // re-sighting later is not fresh and keeps the original block
        let fresh = state.record_children(105, "factory_a", [address]);
        assert!(fresh.is_empty());
        assert_eq!(state.children["factory_a"][&address], 101);
    }

    #[test]
    fn test_rollback_discards_unfinalized_children() {
        let mut state = make_state();
        let early = Address::repeat_byte(1);
        let late = Address::repeat_byte(2);
        state.record_children(101, "factory_a", [early]);
        state.record_children(103, "factory_a", [late]);

        state.rollback_children_above(101);

        assert!(state.children["factory_a"].contains_key(&early));
        assert!(!state.children["factory_a"].contains_key(&late));
    }

    #[test]
    fn test_finalize_children_hands_off_to_store() {
        let mut state = make_state();
        let early = Address::repeat_byte(1);
        let late = Address::repeat_byte(2);
        state.record_children(101, "factory_a", [early]);
        state.record_children(103, "factory_a", [late]);

        let finalized = state.finalize_children(102);
        assert_eq!(finalized["factory_a"][&early], 101);
        assert!(!finalized["factory_a"].contains_key(&late));

        // a later rollback above 102 still removes the unfinalized child
        state.rollback_children_above(102);
        assert!(state.children["factory_a"].contains_key(&early));
        assert!(!state.children["factory_a"].contains_key(&late));
    }
}
