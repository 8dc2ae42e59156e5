//! Ingested items and their per-item claim flags.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::types::{Item, ItemId};

/// Fixed batch of items, each with its own claim flag.
///
/// A flag only ever moves from unclaimed to claimed. Each flag is its own
/// compare-and-swap cell, so claims on different items never contend.
pub struct ItemStore {
    items: Vec<Item>,
    claimed: Vec<AtomicBool>,
    claimed_count: AtomicUsize,
}

impl ItemStore {
    pub fn new(items: Vec<Item>) -> Self {
        let claimed = items.iter().map(|_| AtomicBool::new(false)).collect();
        Self {
            items,
            claimed,
            claimed_count: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn item(&self, id: ItemId) -> Item {
        self.items[id]
    }

    pub fn is_claimed(&self, id: ItemId) -> bool {
        self.claimed[id].load(Ordering::Acquire)
    }

    /// Try to reserve `id`. Exactly one caller ever gets `true` per item.
    pub fn try_claim(&self, id: ItemId) -> bool {
        let flag = &self.claimed[id];
        // Cheap unsynchronized check first; the CAS is the authoritative re-check.
        if flag.load(Ordering::Acquire) {
            return false;
        }
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.claimed_count.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed_count.load(Ordering::Acquire)
    }

    pub fn all_claimed(&self) -> bool {
        self.claimed_count() >= self.items.len()
    }

    /// Ids of items that are still unclaimed at the time of the call.
    pub fn unclaimed(&self) -> impl Iterator<Item = ItemId> + '_ {
        (0..self.items.len()).filter(|&id| !self.is_claimed(id))
    }
}
