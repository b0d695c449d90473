//! Cache Store Module
//!
//! In-memory key/value engine combining HashMap storage with versioned
//! conditional writes, sliding/absolute expiration and LRU eviction of
//! volatile entries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::{
    current_timestamp_ms, CacheEntry, CacheStats, Expiry, LruTracker, MAX_KEY_LENGTH,
    MAX_VALUE_SIZE,
};
use crate::error::{CacheError, Result};

// == Write Condition ==
/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteCondition {
    /// Write unconditionally, overwriting any existing value
    #[default]
    Always,
    /// Write only if no live entry exists under the key
    IfAbsent,
    /// Write only if the live entry currently carries this version
    IfVersion(u64),
}

// == Versioned ==
/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

// == Cache Store ==
/// Main in-memory store.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Access recency of volatile entries only
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Last version handed out
    version_clock: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            version_clock: 0,
        }
    }

    // == Set ==
    /// Stores a value under `key` if `condition` holds and returns its new version.
    ///
    /// An unconditional write over an existing key overwrites the value and
    /// resets its expiry. When the store is at capacity, the least recently
    /// used volatile entry is evicted; entries that never expire are not
    /// eviction candidates.
    pub fn set(
        &mut self,
        key: String,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        if value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::InvalidRequest(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        self.drop_if_expired(&key);
        let current = self.entries.get(&key).map(|entry| entry.version);

        let satisfied = match (condition, current) {
            (WriteCondition::Always, _) => true,
            (WriteCondition::IfAbsent, None) => true,
            (WriteCondition::IfAbsent, Some(_)) => false,
            (WriteCondition::IfVersion(expected), Some(found)) => expected == found,
            (WriteCondition::IfVersion(_), None) => false,
        };
        if !satisfied {
            self.stats.record_conflict();
            return Err(CacheError::VersionConflict(format!(
                "{} (expected {:?}, found {:?})",
                key, condition, current
            )));
        }

        if current.is_none() && self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted_key) => {
                    self.entries.remove(&evicted_key);
                    self.stats.record_eviction();
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "Cache is full and no entry is evictable".to_string(),
                    ));
                }
            }
        }

        self.version_clock += 1;
        let version = self.version_clock;
        let entry = CacheEntry::new(value, version, expiry);

        if entry.is_volatile() {
            self.lru.touch(&key);
        } else {
            self.lru.remove(&key);
        }
        self.entries.insert(key, entry);
        self.stats.set_total_entries(self.entries.len());

        Ok(version)
    }

    // == Get ==
    /// Retrieves a live value and its version.
    ///
    /// Expired entries are removed and counted as misses. A hit restarts the
    /// window of a sliding entry.
    pub fn get(&mut self, key: &str) -> Result<Versioned<String>> {
        self.drop_if_expired(key);

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                let found = Versioned {
                    value: entry.value.clone(),
                    version: entry.version,
                };
                if entry.is_volatile() {
                    self.lru.touch(key);
                }
                self.stats.record_hit();
                Ok(found)
            }
            None => {
                self.stats.record_miss();
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    // == Contains ==
    /// True if `key` holds a live value.
    ///
    /// Unlike [`get`](Self::get) this is a pure lookup: sliding deadlines,
    /// recency and statistics stay as they are.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether a live entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.drop_if_expired(key);
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Stats ==
    /// Returns current store statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.record_expirations(expired_keys.len());
        self.stats.set_total_entries(self.entries.len());
        expired_keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops `key` if its deadline has passed.
    fn drop_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .map(CacheEntry::is_expired)
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            self.stats.record_expirations(1);
            self.stats.set_total_entries(self.entries.len());
        }
    }
}
