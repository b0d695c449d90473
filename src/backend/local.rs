//! Local Backend
//!
//! Adapts the in-process `CacheStore` to the `Backend` trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::cache::{CacheStats, CacheStore, Expiry, Versioned, WriteCondition};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_cleanup_task;

/// Backend over a store living in this process.
///
/// Every operation runs under the store lock, so conditional writes are
/// atomic and no operation fails for transport reasons.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    store: Arc<RwLock<CacheStore>>,
    /// Expiry sweep shared by all clones, stopped with the last one
    sweep: Option<Arc<SweepGuard>>,
}

/// Aborts the sweep task when dropped.
#[derive(Debug)]
struct SweepGuard(JoinHandle<()>);

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl LocalBackend {
    /// Creates a backend over a fresh store of the given capacity.
    pub fn new(max_entries: usize) -> Self {
        Self::from_store(Arc::new(RwLock::new(CacheStore::new(max_entries))))
    }

    /// Wraps an existing shared store.
    pub fn from_store(store: Arc<RwLock<CacheStore>>) -> Self {
        Self { store, sweep: None }
    }

    /// Creates a backend and starts sweeping its expired entries.
    ///
    /// Must be called from within a tokio runtime. The sweep runs on that
    /// runtime until the last clone of the backend is dropped or the runtime
    /// shuts down; after that, expired entries are dropped when accessed.
    pub fn with_cleanup(max_entries: usize, cleanup_interval_secs: u64) -> Self {
        let mut backend = Self::new(max_entries);
        let handle = spawn_cleanup_task(backend.store(), cleanup_interval_secs);
        backend.sweep = Some(Arc::new(SweepGuard(handle)));
        backend
    }

    /// True while an expiry sweep is running for this store.
    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .as_ref()
            .map(|guard| !guard.0.is_finished())
            .unwrap_or(false)
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        self.store.clone()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        // Write lock: reads update recency, sliding deadlines and stats
        let mut store = self.store.write().await;
        match store.get(key) {
            Ok(found) => Ok(Some(found)),
            Err(CacheError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        let mut store = self.store.write().await;
        store.set(key.to_string(), value, expiry, condition)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.delete(key);
        Ok(())
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(keys.iter().filter(|key| store.contains(key)).cloned().collect())
    }
}
