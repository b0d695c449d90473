//! LRU Tracker Module
//!
//! Tracks access recency of evictable store entries.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Every touch stamps the key with a fresh tick; the smallest tick is the
/// least recently used key. Both touch and eviction are O(log n).
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Next tick to hand out
    clock: u64,
    /// Key -> tick of last access
    ticks: HashMap<String, u64>,
    /// Tick of last access -> key, ordered oldest first
    order: BTreeMap<u64, String>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, tracking it if new.
    pub fn touch(&mut self, key: &str) {
        self.clock += 1;
        if let Some(previous) = self.ticks.insert(key.to_string(), self.clock) {
            self.order.remove(&previous);
        }
        self.order.insert(self.clock, key.to_string());
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Evict Oldest ==
    /// Returns and forgets the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ticks.contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.peek_oldest(), None);
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");
        lru.touch("c");
        lru.touch("a");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some("b"));
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");
        lru.touch("c");
        lru.touch("a");
        lru.touch("c");

        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
        assert_eq!(lru.evict_oldest(), Some("a".to_string()));
        assert_eq!(lru.evict_oldest(), Some("c".to_string()));
        assert_eq!(lru.evict_oldest(), None);
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");
        lru.remove("a");
        lru.remove("missing");

        assert_eq!(lru.len(), 1);
        assert!(!lru.contains("a"));
        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
        assert!(lru.is_empty());
    }
}
