//! Composability index
//!
//! For every (vehicle, child collection) pair the index keeps the ids of the
//! attached children in attachment order, plus the reverse mapping from
//! (child collection, child id) back to the vehicle. Both sides are written
//! together and never rewritten.

use std::collections::HashMap;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Two-way parent/child index for one vehicle collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildIndex {
    /// (vehicle id, child collection) -> child ids in attachment order
    children: HashMap<(u64, Address), Vec<u64>>,

    /// (child collection, child id) -> vehicle id
    parents: HashMap<(Address, u64), u64>,
}

impl ChildIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child_id` of `collection` as the next child of `root_id`
    ///
    /// A child can be attached once. A second attach is rejected before any
    /// state changes.
    pub fn attach(&mut self, root_id: u64, collection: Address, child_id: u64) -> Result<()> {
        if let Some(existing) = self.parents.get(&(collection, child_id)) {
            return Err(RegistryError::State(format!(
                "child {} of {:?} is already attached to vehicle {}",
                child_id, collection, existing
            )));
        }

        self.children
            .entry((root_id, collection))
            .or_default()
            .push(child_id);
        self.parents.insert((collection, child_id), root_id);

        Ok(())
    }

    /// Number of children of `collection` attached to `root_id`
    pub fn child_count(&self, root_id: u64, collection: &Address) -> usize {
        self.children
            .get(&(root_id, *collection))
            .map_or(0, Vec::len)
    }

    /// Child id at `index` in attachment order
    pub fn child_at(&self, root_id: u64, collection: &Address, index: usize) -> Result<u64> {
        let children = self.children(root_id, collection);
        children
            .get(index)
            .copied()
            .ok_or(RegistryError::IndexOutOfRange {
                index,
                count: children.len(),
            })
    }

    /// All children of `collection` attached to `root_id`, in attachment order
    pub fn children(&self, root_id: u64, collection: &Address) -> &[u64] {
        self.children
            .get(&(root_id, *collection))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Vehicle a child is attached to, if any
    pub fn parent_of(&self, collection: &Address, child_id: u64) -> Option<u64> {
        self.parents.get(&(*collection, child_id)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collection(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_attach_and_enumerate() {
        let mut index = ChildIndex::new();
        let mot = collection(100);

        index.attach(1, mot, 7).unwrap();
        index.attach(1, mot, 3).unwrap();
        index.attach(2, mot, 4).unwrap();

        assert_eq!(index.child_count(1, &mot), 2);
        assert_eq!(index.child_at(1, &mot, 0).unwrap(), 7);
        assert_eq!(index.child_at(1, &mot, 1).unwrap(), 3);
        assert_eq!(index.children(2, &mot), &[4]);
        assert_eq!(index.parent_of(&mot, 3), Some(1));
        assert_eq!(index.parent_of(&mot, 4), Some(2));
        assert_eq!(index.parent_of(&mot, 8), None);
    }

    #[test]
    fn test_collections_are_kept_apart() {
        let mut index = ChildIndex::new();

        index.attach(1, collection(100), 1).unwrap();
        index.attach(1, collection(200), 1).unwrap();

        assert_eq!(index.child_count(1, &collection(100)), 1);
        assert_eq!(index.child_count(1, &collection(200)), 1);
        assert_eq!(index.child_count(1, &collection(300)), 0);
    }

    #[test]
    fn test_child_at_out_of_range() {
        let mut index = ChildIndex::new();
        let mot = collection(100);
        index.attach(1, mot, 1).unwrap();

        let err = index.child_at(1, &mot, 1).unwrap_err();
        assert!(matches!(err, RegistryError::IndexOutOfRange { index: 1, count: 1 }));

        let err = index.child_at(9, &mot, 0).unwrap_err();
        assert!(matches!(err, RegistryError::IndexOutOfRange { index: 0, count: 0 }));
    }

    #[test]
    fn test_double_attach_is_rejected_without_change() {
        let mut index = ChildIndex::new();
        let mot = collection(100);
        index.attach(1, mot, 5).unwrap();

        assert!(matches!(index.attach(2, mot, 5), Err(RegistryError::State(_))));
        assert_eq!(index.child_count(2, &mot), 0);
        assert_eq!(index.parent_of(&mot, 5), Some(1));
    }

    proptest! {
        #[test]
        fn prop_enumeration_follows_attachment_order(
            roots in prop::collection::vec(1u64..5, 0..64)
        ) {
            let mut index = ChildIndex::new();
            let mot = collection(100);
            let mut expected: HashMap<u64, Vec<u64>> = HashMap::new();

            for (i, root) in roots.iter().enumerate() {
                let child_id = i as u64 + 1;
                index.attach(*root, mot, child_id).unwrap();
                expected.entry(*root).or_default().push(child_id);
            }

            for (root, ids) in &expected {
                prop_assert_eq!(index.child_count(*root, &mot), ids.len());
                for (i, id) in ids.iter().enumerate() {
                    prop_assert_eq!(index.child_at(*root, &mot, i).unwrap(), *id);
                    prop_assert_eq!(index.parent_of(&mot, *id), Some(*root));
                }
                prop_assert!(index.child_at(*root, &mot, ids.len()).is_err());
            }
            prop_assert_eq!(index.parent_of(&mot, roots.len() as u64 + 1), None);
        }
    }
}
