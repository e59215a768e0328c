//! dedup.rs — seen-set of listings already notified in the current epoch.
//!
//! All-or-nothing model: identities are only ever appended, and the whole set
//! is dropped on `reset`. There is no per-item expiry; a listing that stays up
//! past the epoch window gets notified again.

use std::collections::HashSet;

use crate::listing::ListingIdentity;

#[derive(Debug, Clone, Default)]
pub struct ListingDeduplicator {
    order: Vec<ListingIdentity>,
    index: HashSet<ListingIdentity>,
}

impl ListingDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `identity` was not notified in this epoch. Does NOT mutate state.
    pub fn is_new(&self, identity: &ListingIdentity) -> bool {
        !self.index.contains(identity)
    }

    /// Remember `identity`. Returns false if it was already present.
    pub fn mark_seen(&mut self, identity: ListingIdentity) -> bool {
        if !self.index.insert(identity.clone()) {
            return false;
        }
        self.order.push(identity);
        true
    }

    /// Forget everything. Returns how many identities were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.order.len();
        self.order.clear();
        self.index.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Seen identities in the order they were first notified.
    pub fn iter(&self) -> impl Iterator<Item = &ListingIdentity> {
        self.order.iter()
    }
}
