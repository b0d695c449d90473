//! Cache Statistics Module
//!
//! Tracks store metrics including hits, misses, evictions and expirations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks store performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful retrievals
    pub hits: u64,
    /// Number of failed retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted under capacity pressure
    pub evictions: u64,
    /// Number of entries dropped because their deadline passed
    pub expirations: u64,
    /// Number of conditional writes rejected
    pub conflicts: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
}

impl CacheStats {
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_conflict(&mut self) {
        self.conflicts += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
