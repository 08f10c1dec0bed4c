use std::collections::{HashMap, VecDeque};

use super::CacheEntry;

/// Insertion-ordered entry index for a single cache. Eviction is pure FIFO:
/// no access-recency tracking, oldest insertion goes first. Re-inserting an
/// existing key moves it to the back of the queue.
#[derive(Debug, Default)]
pub(super) struct FifoIndex {
    order: VecDeque<String>,
    entries: HashMap<String, CacheEntry>,
}

impl FifoIndex {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn get(&self, key_base: &str) -> Option<&CacheEntry> {
        self.entries.get(key_base)
    }

    pub(super) fn insert(&mut self, key_base: String, entry: CacheEntry) -> Option<CacheEntry> {
        let replaced = self.entries.insert(key_base.clone(), entry);
        if replaced.is_some() {
            self.order.retain(|key| key != &key_base);
        }
        self.order.push_back(key_base);
        replaced
    }

    pub(super) fn remove(&mut self, key_base: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key_base)?;
        self.order.retain(|key| key != key_base);
        Some(removed)
    }

    /// Drops the oldest entries until at most `max_items` remain, returning
    /// the evicted records so their files can be reclaimed.
    pub(super) fn evict_to(&mut self, max_items: usize) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.order.len() > max_items {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                evicted.push(entry);
            }
        }
        evicted
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
