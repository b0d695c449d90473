//! Dependency Index Module
//!
//! Maps each entity set to the cache keys whose values depend on it. Records
//! live in the same backend as the values, under keys of the form
//! `dependent_entity_set_<name>`, as a JSON array of cache keys.
//!
//! Appending to a record is a read followed by a write. In
//! [`RegisterMode::BestEffort`] the write is unconditional, so two concurrent
//! registrations against a store without native atomic updates can lose one
//! of the keys. [`RegisterMode::Optimistic`] writes against the version it
//! read and retries on conflict, which closes that window on any backend
//! honoring write conditions.
//!
//! Records only shrink on invalidation, so keys whose values expired or were
//! evicted pile up. Every `prune_interval` keys, or when a record is about to
//! outgrow the value size limit, registration drops the keys the backend no
//! longer holds. A value written while its key was being pruned is put back
//! either by the pruner's recheck or by [`DependencyIndex::confirm`] after
//! the value lands.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{Expiry, Versioned, WriteCondition, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};
use crate::fingerprint::fingerprint;

/// Reserved key namespace of dependency records.
pub const DEPENDENCY_KEY_PREFIX: &str = "dependent_entity_set_";

/// Record length at which registration checks for dead keys.
pub const DEFAULT_PRUNE_INTERVAL: usize = 1024;

// == Entity Set Name ==
/// Name of an entity set. Equality, ordering and hashing ignore case.
#[derive(Debug, Clone)]
pub struct EntitySetName {
    original: String,
    normalized: String,
}

impl EntitySetName {
    pub fn new(name: impl Into<String>) -> Self {
        let original = name.into();
        let normalized = original.to_lowercase();
        Self {
            original,
            normalized,
        }
    }

    /// The name as first spelled by the caller.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Backend key of this entity set's dependency record.
    ///
    /// Names too long for a backend key are replaced by their fingerprint.
    pub fn record_key(&self) -> String {
        let key = format!("{}{}", DEPENDENCY_KEY_PREFIX, self.normalized);
        if key.len() <= MAX_KEY_LENGTH {
            key
        } else {
            format!("{}{}", DEPENDENCY_KEY_PREFIX, fingerprint(&self.normalized))
        }
    }
}

impl PartialEq for EntitySetName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for EntitySetName {}

impl Hash for EntitySetName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for EntitySetName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntitySetName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for EntitySetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl From<&str> for EntitySetName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntitySetName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

// == Register Mode ==
/// How a record is updated when a key is appended or the record is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterMode {
    /// Read, modify, write unconditionally. Concurrent updates may be lost.
    BestEffort,
    /// Read a version, write only if unchanged, retry up to `max_attempts`.
    Optimistic { max_attempts: u32 },
}

// == Invalidation Report ==
/// Outcome of invalidating several entity sets.
#[derive(Debug, Default)]
pub struct InvalidationReport {
    /// Dependent entries removed across all entity sets
    pub removed: usize,
    /// Entity sets whose invalidation failed, with the cause
    pub failures: Vec<(EntitySetName, CacheError)>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// == Dependency Index ==
/// Per-entity-set registry of dependent cache keys kept in a backend.
#[derive(Clone)]
pub struct DependencyIndex {
    backend: Arc<dyn Backend>,
    mode: RegisterMode,
    prune_interval: usize,
}

impl DependencyIndex {
    pub fn new(backend: Arc<dyn Backend>, mode: RegisterMode) -> Self {
        Self {
            backend,
            mode,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        }
    }

    /// Sets how many keys a record holds between liveness checks.
    pub fn with_prune_interval(mut self, interval: usize) -> Self {
        self.prune_interval = interval.max(1);
        self
    }

    pub fn mode(&self) -> RegisterMode {
        self.mode
    }

    pub fn prune_interval(&self) -> usize {
        self.prune_interval
    }

    // == Register ==
    /// Records that `cache_key` depends on `entity_set`.
    ///
    /// Creates the record on first use. Registering a key already present
    /// writes nothing. In optimistic mode, exhausting the retry budget returns
    /// `CacheError::VersionConflict`.
    pub async fn register(&self, entity_set: &EntitySetName, cache_key: &str) -> Result<()> {
        let pruned = self
            .append(entity_set, &[cache_key.to_string()], true)
            .await?;
        if !pruned.is_empty() {
            self.restore_revived(entity_set, pruned).await?;
        }
        Ok(())
    }

    // == Confirm ==
    /// Registers `cache_key` again if it went missing from the record.
    ///
    /// Called once the value is stored: a prune that ran between
    /// registration and the write may have dropped the key as dead.
    pub async fn confirm(&self, entity_set: &EntitySetName, cache_key: &str) -> Result<()> {
        if self.dependents(entity_set).await?.contains(cache_key) {
            return Ok(());
        }
        debug!(
            entity_set = %entity_set,
            key = cache_key,
            "Dependency missing after store, registering again"
        );
        self.append(entity_set, &[cache_key.to_string()], false)
            .await
            .map(|_| ())
    }

    /// Adds `new_keys` to the record, pruning dead keys first when due.
    /// Returns the keys pruned by the write that landed.
    async fn append(
        &self,
        entity_set: &EntitySetName,
        new_keys: &[String],
        may_prune: bool,
    ) -> Result<Vec<String>> {
        let record_key = entity_set.record_key();
        let attempts = match self.mode {
            RegisterMode::BestEffort => 1,
            RegisterMode::Optimistic { max_attempts } => max_attempts,
        };

        for attempt in 1..=attempts {
            let (mut keys, condition) = match self.read(entity_set).await? {
                Some(Versioned { value, version }) => (value, WriteCondition::IfVersion(version)),
                None => (BTreeSet::new(), WriteCondition::IfAbsent),
            };
            if new_keys.iter().all(|key| keys.contains(key)) {
                return Ok(Vec::new());
            }

            let pruned = if may_prune && self.prune_due(&keys, new_keys) {
                self.prune(entity_set, &mut keys, new_keys).await
            } else {
                Vec::new()
            };
            keys.extend(new_keys.iter().cloned());

            let condition = match self.mode {
                RegisterMode::BestEffort => WriteCondition::Always,
                RegisterMode::Optimistic { .. } => condition,
            };
            match self.write(&record_key, &keys, condition).await {
                Ok(_) => {
                    debug!(
                        entity_set = %entity_set,
                        added = new_keys.len(),
                        pruned = pruned.len(),
                        attempt,
                        "Dependency registered"
                    );
                    return Ok(pruned);
                }
                Err(CacheError::VersionConflict(_)) => {
                    debug!(entity_set = %entity_set, attempt, "Dependency record changed, retrying");
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }
        }

        Err(CacheError::VersionConflict(format!(
            "gave up registering under {} after {} attempts",
            entity_set, attempts
        )))
    }

    /// True when the record reached a multiple of the prune interval or
    /// would not fit in a value once `new_keys` are added.
    fn prune_due(&self, keys: &BTreeSet<String>, new_keys: &[String]) -> bool {
        if !keys.is_empty() && keys.len() % self.prune_interval == 0 {
            return true;
        }
        let encoded: usize = keys
            .iter()
            .chain(new_keys)
            .map(|key| key.len() + 3)
            .sum::<usize>()
            + 1;
        encoded > MAX_VALUE_SIZE
    }

    /// Removes the keys the backend no longer holds, returning them.
    ///
    /// A failed liveness check leaves the record as it is.
    async fn prune(
        &self,
        entity_set: &EntitySetName,
        keys: &mut BTreeSet<String>,
        new_keys: &[String],
    ) -> Vec<String> {
        let candidates: Vec<String> = keys
            .iter()
            .filter(|key| !new_keys.contains(*key))
            .cloned()
            .collect();

        let live: HashSet<String> = match self.backend.live_keys(&candidates).await {
            Ok(live) => live.into_iter().collect(),
            Err(err) => {
                warn!(entity_set = %entity_set, error = %err, "Liveness check failed, record not pruned");
                return Vec::new();
            }
        };

        let dead: Vec<String> = candidates
            .into_iter()
            .filter(|key| !live.contains(key))
            .collect();
        for key in &dead {
            keys.remove(key);
        }
        debug!(entity_set = %entity_set, dead = dead.len(), kept = keys.len(), "Dependency record pruned");
        dead
    }

    /// Puts back pruned keys whose values were stored while the prune ran.
    ///
    /// If they cannot be checked, their values are removed instead.
    async fn restore_revived(&self, entity_set: &EntitySetName, pruned: Vec<String>) -> Result<()> {
        match self.backend.live_keys(&pruned).await {
            Ok(revived) if revived.is_empty() => Ok(()),
            Ok(revived) => {
                debug!(
                    entity_set = %entity_set,
                    restored = revived.len(),
                    "Restoring dependents stored during prune"
                );
                self.append(entity_set, &revived, false).await.map(|_| ())
            }
            Err(err) => {
                warn!(
                    entity_set = %entity_set,
                    error = %err,
                    "Could not recheck pruned dependents, removing their values"
                );
                self.remove_dependents(entity_set, &pruned).await
            }
        }
    }

    // == Invalidate ==
    /// Removes every entry depending on `entity_set` and clears its record.
    ///
    /// Returns the number of dependent keys removed. A missing or empty record
    /// is a no-op, so a repeated call removes nothing. If removing a dependent
    /// fails, the record is left untouched for a later retry and the error is
    /// returned.
    pub async fn invalidate(&self, entity_set: &EntitySetName) -> Result<usize> {
        let record_key = entity_set.record_key();
        let attempts = match self.mode {
            RegisterMode::BestEffort => 1,
            RegisterMode::Optimistic { max_attempts } => max_attempts,
        };
        let mut removed: BTreeSet<String> = BTreeSet::new();

        for attempt in 1..=attempts {
            let record = match self.read(entity_set).await? {
                Some(record) if !record.value.is_empty() => record,
                _ => return Ok(removed.len()),
            };

            let pending: Vec<String> = record.value.difference(&removed).cloned().collect();
            self.remove_dependents(entity_set, &pending).await?;
            removed.extend(pending);

            match self.mode {
                RegisterMode::BestEffort => {
                    self.backend.remove(&record_key).await?;
                    break;
                }
                RegisterMode::Optimistic { .. } => {
                    let cleared = self
                        .write(
                            &record_key,
                            &BTreeSet::new(),
                            WriteCondition::IfVersion(record.version),
                        )
                        .await;
                    match cleared {
                        Ok(_) => break,
                        Err(CacheError::VersionConflict(_)) => {
                            debug!(
                                entity_set = %entity_set,
                                attempt,
                                "Dependency record changed during invalidation, rereading"
                            );
                            if attempt == attempts {
                                return Err(CacheError::VersionConflict(format!(
                                    "gave up clearing {} after {} attempts",
                                    record_key, attempts
                                )));
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        debug!(entity_set = %entity_set, removed = removed.len(), "Entity set invalidated");
        Ok(removed.len())
    }

    // == Invalidate Many ==
    /// Invalidates each distinct entity set, continuing past failures.
    pub async fn invalidate_many(&self, entity_sets: &[EntitySetName]) -> InvalidationReport {
        let distinct: BTreeSet<&EntitySetName> = entity_sets.iter().collect();
        let mut report = InvalidationReport::default();

        for entity_set in distinct {
            match self.invalidate(entity_set).await {
                Ok(count) => report.removed += count,
                Err(err) => {
                    warn!(entity_set = %entity_set, error = %err, "Invalidation failed");
                    report.failures.push((entity_set.clone(), err));
                }
            }
        }

        report
    }

    // == Dependents ==
    /// Current dependent keys of `entity_set`.
    pub async fn dependents(&self, entity_set: &EntitySetName) -> Result<BTreeSet<String>> {
        Ok(self
            .read(entity_set)
            .await?
            .map(|record| record.value)
            .unwrap_or_default())
    }

    async fn read(&self, entity_set: &EntitySetName) -> Result<Option<Versioned<BTreeSet<String>>>> {
        let found = self.backend.get(&entity_set.record_key()).await?;
        Ok(found.map(|Versioned { value, version }| Versioned {
            value: decode_record(entity_set, &value),
            version,
        }))
    }

    async fn write(
        &self,
        record_key: &str,
        keys: &BTreeSet<String>,
        condition: WriteCondition,
    ) -> Result<u64> {
        let encoded = serde_json::to_string(keys)?;
        self.backend
            .put(record_key, encoded, Expiry::Never, condition)
            .await
    }

    /// Removes each key, returning the first failure after trying them all.
    async fn remove_dependents(&self, entity_set: &EntitySetName, keys: &[String]) -> Result<()> {
        let mut first_error = None;

        for key in keys {
            if let Err(err) = self.backend.remove(key).await {
                warn!(entity_set = %entity_set, key = %key, error = %err, "Failed to remove dependent entry");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Decodes a record, treating anything but a list of keys as empty.
fn decode_record(entity_set: &EntitySetName, raw: &str) -> BTreeSet<String> {
    match serde_json::from_str::<BTreeSet<String>>(raw) {
        Ok(keys) => keys,
        Err(err) => {
            warn!(
                entity_set = %entity_set,
                error = %err,
                "Malformed dependency record, treating as empty"
            );
            BTreeSet::new()
        }
    }
}
