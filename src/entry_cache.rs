//! Entry Cache Module
//!
//! Public face of the query-result cache. Values are stored under the
//! fingerprint of their query text; every entity set a value depends on gets
//! the fingerprint registered in the dependency index before the value is
//! written, so an invalidation racing with the write removes too much rather
//! than leaving a stale value behind. Once the value is written each
//! registration is confirmed, since a concurrent prune of the record may
//! have dropped the key while the value did not exist yet.
//!
//! None of the operations report backend trouble to the caller: a failed
//! write is a value that is not cached, a failed read is a miss.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::backend::{Backend, BackendFactory};
use crate::cache::{Expiry, WriteCondition};
use crate::config::CacheSettings;
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::index::{DependencyIndex, EntitySetName};

// == Result Set ==
/// A cacheable query result that knows whether it holds any rows.
pub trait ResultSet {
    fn is_empty_result(&self) -> bool;
}

impl<T> ResultSet for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl ResultSet for serde_json::Value {
    fn is_empty_result(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::Array(rows) => rows.is_empty(),
            _ => false,
        }
    }
}

/// Why a put was dropped before touching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyResult,
    IgnoredEntitySet,
}

/// What a put did. Informational only; no outcome is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Dependencies registered and value stored
    Stored,
    /// Policy short-circuit, nothing written
    Skipped(SkipReason),
    /// Value could not be encoded or a dependency could not be registered;
    /// the value was not stored
    Abandoned,
    /// Dependencies registered but the value write failed, or a dependency
    /// could not be confirmed afterwards and the value was removed again
    StoreFailed,
}

// == Entry Cache ==
/// Query-result cache with entity-set invalidation over any [`Backend`].
pub struct EntryCache<T> {
    backend: Arc<dyn Backend>,
    index: DependencyIndex,
    ignored: HashSet<EntitySetName>,
    default_sliding: Duration,
    _values: PhantomData<fn() -> T>,
}

impl<T> Clone for EntryCache<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            index: self.index.clone(),
            ignored: self.ignored.clone(),
            default_sliding: self.default_sliding,
            _values: PhantomData,
        }
    }
}

impl<T> EntryCache<T>
where
    T: ResultSet + Serialize + DeserializeOwned,
{
    /// Creates a cache over an already constructed backend.
    ///
    /// The backend section of `settings` is not used; the rest is validated.
    pub fn new(backend: Arc<dyn Backend>, settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            index: DependencyIndex::new(backend.clone(), settings.register_mode)
                .with_prune_interval(settings.prune_interval),
            backend,
            ignored: settings
                .ignored_entity_sets
                .iter()
                .map(|name| EntitySetName::new(name.as_str()))
                .collect(),
            default_sliding: settings.default_sliding,
            _values: PhantomData,
        })
    }

    /// Builds the configured backend through the process-wide factory.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        Self::with_factory(BackendFactory::global(), settings)
    }

    /// Builds the configured backend through `factory`.
    pub fn with_factory(factory: &BackendFactory, settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        let backend = factory.get_or_create(&settings.cache_name, &settings.backend)?;
        Self::new(backend, settings)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    pub fn is_ignored(&self, entity_set: &str) -> bool {
        self.ignored.contains(&EntitySetName::new(entity_set))
    }

    // == Try Get ==
    /// Looks up the cached result of `query`.
    pub async fn try_get(&self, query: &str) -> Option<T> {
        let key = fingerprint(query);

        let found = match self.backend.get(&key).await {
            Ok(found) => found?,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&found.value) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Cached value undecodable, treating as miss");
                None
            }
        }
    }

    // == Put ==
    /// Caches `value` as the result of `query`, dependent on `dependent_entity_sets`.
    ///
    /// A sliding expiration wins over an absolute one; with neither, the
    /// configured default sliding expiration applies.
    pub async fn put<S: AsRef<str>>(
        &self,
        query: &str,
        value: &T,
        dependent_entity_sets: &[S],
        sliding_expiration: Option<Duration>,
        absolute_expiration: Option<DateTime<Utc>>,
    ) -> PutOutcome {
        if value.is_empty_result() {
            return PutOutcome::Skipped(SkipReason::EmptyResult);
        }

        let entity_sets = distinct_names(dependent_entity_sets);
        if let Some(ignored) = entity_sets.iter().find(|name| self.ignored.contains(*name)) {
            debug!(entity_set = %ignored, "Put names an ignored entity set, skipping");
            return PutOutcome::Skipped(SkipReason::IgnoredEntitySet);
        }

        let key = fingerprint(query);
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = %key, error = %err, "Value not serializable, not caching");
                return PutOutcome::Abandoned;
            }
        };

        for entity_set in &entity_sets {
            if let Err(err) = self.index.register(entity_set, &key).await {
                warn!(
                    key = %key,
                    entity_set = %entity_set,
                    error = %err,
                    "Dependency registration failed, not caching"
                );
                return PutOutcome::Abandoned;
            }
        }

        let expiry = Expiry::resolve(sliding_expiration, absolute_expiration)
            .unwrap_or(Expiry::Sliding(self.default_sliding));

        if let Err(err) = self
            .backend
            .put(&key, encoded, expiry, WriteCondition::Always)
            .await
        {
            warn!(key = %key, error = %err, "Cache write failed, value not cached");
            return PutOutcome::StoreFailed;
        }

        for entity_set in &entity_sets {
            if let Err(err) = self.index.confirm(entity_set, &key).await {
                warn!(
                    key = %key,
                    entity_set = %entity_set,
                    error = %err,
                    "Dependency lost after store, removing value"
                );
                if let Err(err) = self.backend.remove(&key).await {
                    error!(key = %key, error = %err, "Unregistered value could not be removed");
                }
                return PutOutcome::StoreFailed;
            }
        }

        debug!(key = %key, dependencies = entity_sets.len(), "Cached query result");
        PutOutcome::Stored
    }

    // == Invalidate Entity Sets ==
    /// Removes every cached result depending on any of `entity_sets`.
    ///
    /// If any name is ignored the whole call is dropped. Returns the number
    /// of dependent entries removed.
    pub async fn invalidate_entity_sets<S: AsRef<str>>(&self, entity_sets: &[S]) -> usize {
        let names = distinct_names(entity_sets);
        if names.iter().any(|name| self.ignored.contains(name)) {
            debug!("Invalidation names an ignored entity set, dropping");
            return 0;
        }

        let report = self.index.invalidate_many(&names).await;
        for (entity_set, err) in &report.failures {
            if err.is_transient() {
                warn!(entity_set = %entity_set, error = %err, "Entity set left partially invalidated");
            } else {
                error!(entity_set = %entity_set, error = %err, "Entity set invalidation failed");
            }
        }
        report.removed
    }

    // == Invalidate Key ==
    /// Removes the cached result of `query` alone, without cascading.
    pub async fn invalidate_key(&self, query: &str) {
        let key = fingerprint(query);
        if let Err(err) = self.backend.remove(&key).await {
            warn!(key = %key, error = %err, "Cache remove failed");
        }
    }
}

/// Entity set names in caller order, without case-insensitive duplicates.
fn distinct_names<S: AsRef<str>>(names: &[S]) -> Vec<EntitySetName> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| EntitySetName::new(name.as_ref()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
