//! The deduplicated store of every item ever collected.
//!
//! Identity is the only dedup key. The first stored copy of an identity
//! wins; later sightings are reported as duplicates and leave the stored
//! item untouched. There is deliberately no removal operation.

use std::collections::HashMap;

use crate::models::Item;

/// Result of merging one item into the [`Corpus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    New,
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    items: HashMap<String, Item>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, item: Item) -> MergeOutcome {
        use std::collections::hash_map::Entry;

        match self.items.entry(item.identity.clone()) {
            Entry::Occupied(_) => MergeOutcome::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(item);
                MergeOutcome::New
            }
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.items.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Item> {
        self.items.get(identity)
    }

    /// Iterate stored items in unspecified order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

impl FromIterator<Item> for Corpus {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        let mut corpus = Corpus::new();
        for item in iter {
            corpus.merge(item);
        }
        corpus
    }
}
