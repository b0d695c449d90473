//! Test doubles wrapping the local backend.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{Backend, LocalBackend};
use crate::cache::{Expiry, Versioned, WriteCondition};
use crate::error::{CacheError, Result};
use crate::index::DEPENDENCY_KEY_PREFIX;

/// Local backend whose operations can be made to fail on demand.
pub struct FlakyBackend {
    pub inner: LocalBackend,
    /// Fail every put whose key starts with this prefix
    fail_put_prefix: Mutex<Option<String>>,
    /// Fail every get
    pub fail_gets: AtomicBool,
    /// Fail removes of these keys
    fail_removes: Mutex<HashSet<String>>,
    pub puts: AtomicUsize,
    pub removes: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: LocalBackend::new(1000),
            fail_put_prefix: Mutex::new(None),
            fail_gets: AtomicBool::new(false),
            fail_removes: Mutex::new(HashSet::new()),
            puts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    pub fn fail_puts_with_prefix(&self, prefix: Option<&str>) {
        *self.fail_put_prefix.lock().unwrap() = prefix.map(String::from);
    }

    pub fn fail_remove_of(&self, key: &str) {
        self.fail_removes.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_removes(&self) {
        self.fail_removes.lock().unwrap().clear();
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("injected get failure".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        let fail = self
            .fail_put_prefix
            .lock()
            .unwrap()
            .as_deref()
            .map(|prefix| key.starts_with(prefix))
            .unwrap_or(false);
        if fail {
            return Err(CacheError::Backend("injected put failure".to_string()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, expiry, condition).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let fail = self.fail_removes.lock().unwrap().contains(key);
        if fail {
            return Err(CacheError::Backend("injected remove failure".to_string()));
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("injected lookup failure".to_string()));
        }
        self.inner.live_keys(keys).await
    }
}

/// Local backend that lets another writer slip in between a caller's read
/// and its write of one record, reproducing a lost-update interleaving.
pub struct RacingBackend {
    pub inner: LocalBackend,
    record_key: String,
    /// Value the competing writer stores, taken on first use
    competing_write: Mutex<Option<String>>,
}

impl RacingBackend {
    pub fn new(record_key: &str, competing_value: &str) -> Self {
        Self {
            inner: LocalBackend::new(1000),
            record_key: record_key.to_string(),
            competing_write: Mutex::new(Some(competing_value.to_string())),
        }
    }
}

#[async_trait]
impl Backend for RacingBackend {
    fn name(&self) -> &str {
        "racing"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        if key == self.record_key {
            let competing = self.competing_write.lock().unwrap().take();
            if let Some(competing) = competing {
                self.inner
                    .put(key, competing, Expiry::Never, WriteCondition::Always)
                    .await?;
            }
        }
        self.inner.put(key, value, expiry, condition).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        self.inner.live_keys(keys).await
    }
}

/// Local backend where a value lands right after the first liveness check
/// reported it missing, the way a slow put finishes while a record is pruned.
pub struct LateWriteBackend {
    pub inner: LocalBackend,
    late_key: Mutex<Option<String>>,
}

impl LateWriteBackend {
    pub fn new(late_key: &str) -> Self {
        Self {
            inner: LocalBackend::new(1000),
            late_key: Mutex::new(Some(late_key.to_string())),
        }
    }
}

#[async_trait]
impl Backend for LateWriteBackend {
    fn name(&self) -> &str {
        "late-write"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        self.inner.put(key, value, expiry, condition).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        let live = self.inner.live_keys(keys).await?;
        let late = self.late_key.lock().unwrap().take();
        if let Some(late) = late {
            self.inner
                .put(
                    &late,
                    "[1]".to_string(),
                    Expiry::Sliding(Duration::from_secs(60)),
                    WriteCondition::Always,
                )
                .await?;
        }
        Ok(live)
    }
}

/// Local backend that empties one dependency record just before the first
/// value write, as a prune or an invalidation landing between a put's
/// registration and its store would.
pub struct WipingBackend {
    pub inner: LocalBackend,
    record_key: String,
    armed: AtomicBool,
    freeze_after_wipe: bool,
    frozen: AtomicBool,
}

impl WipingBackend {
    pub fn new(record_key: &str) -> Self {
        Self {
            inner: LocalBackend::new(1000),
            record_key: record_key.to_string(),
            armed: AtomicBool::new(true),
            freeze_after_wipe: false,
            frozen: AtomicBool::new(false),
        }
    }

    /// Also rejects every later write of the record.
    pub fn freezing(mut self) -> Self {
        self.freeze_after_wipe = true;
        self
    }
}

#[async_trait]
impl Backend for WipingBackend {
    fn name(&self) -> &str {
        "wiping"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        if key == self.record_key && self.frozen.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("injected record write failure".to_string()));
        }
        if !key.starts_with(DEPENDENCY_KEY_PREFIX) && self.armed.swap(false, Ordering::SeqCst) {
            self.inner
                .put(&self.record_key, "[]".to_string(), Expiry::Never, WriteCondition::Always)
                .await?;
            self.frozen.store(self.freeze_after_wipe, Ordering::SeqCst);
        }
        self.inner.put(key, value, expiry, condition).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        self.inner.live_keys(keys).await
    }
}
