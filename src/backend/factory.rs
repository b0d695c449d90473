//! Backend Factory
//!
//! Builds backends from configuration and hands out one shared instance per
//! backend identity, so every cache in the process bound to the same store
//! sees the same data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{info, warn};

use crate::backend::{Backend, LocalBackend, RemoteBackend};
use crate::config::BackendConfig;
use crate::error::{CacheError, Result};

/// Registry of constructed backends keyed by identity.
///
/// The mutex only guards construction and lookup; data operations never
/// touch it.
#[derive(Default)]
pub struct BackendFactory {
    backends: Mutex<HashMap<String, Arc<dyn Backend>>>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide factory.
    pub fn global() -> &'static BackendFactory {
        static GLOBAL: OnceLock<BackendFactory> = OnceLock::new();
        GLOBAL.get_or_init(BackendFactory::new)
    }

    /// Returns the backend for `config`, building it on first use.
    ///
    /// `cache_name` scopes local stores: two caches with the same name share
    /// one in-process store. Remote backends are shared per base URL and
    /// request timeout.
    pub fn get_or_create(&self, cache_name: &str, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        if cache_name.trim().is_empty() {
            return Err(CacheError::Config("Cache name cannot be empty".to_string()));
        }

        let identity = match config {
            BackendConfig::Local { .. } => format!("local:{}", cache_name),
            BackendConfig::Remote { base_url, timeout } => {
                format!("remote:{}#timeout_ms={}", base_url, timeout.as_millis())
            }
        };

        let mut backends = self
            .backends
            .lock()
            .map_err(|_| CacheError::Internal("Backend registry lock poisoned".to_string()))?;

        if let Some(existing) = backends.get(&identity) {
            return Ok(existing.clone());
        }

        let backend = build_backend(config)?;
        info!(identity = %identity, backend = backend.name(), "Backend created");
        backends.insert(identity, backend.clone());
        Ok(backend)
    }

    /// Number of backends constructed so far.
    pub fn len(&self) -> usize {
        self.backends.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>> {
    match config {
        BackendConfig::Local {
            max_entries,
            cleanup_interval,
        } => {
            if *max_entries == 0 {
                return Err(CacheError::Config("max_entries must be positive".to_string()));
            }
            // The sweep lives on the current runtime. Without one, or once it
            // shuts down, expired entries are only dropped on access.
            if tokio::runtime::Handle::try_current().is_ok() {
                Ok(Arc::new(LocalBackend::with_cleanup(*max_entries, *cleanup_interval)))
            } else {
                warn!("No tokio runtime, local backend starts without expiry sweep");
                Ok(Arc::new(LocalBackend::new(*max_entries)))
            }
        }
        BackendConfig::Remote { base_url, timeout } => {
            Ok(Arc::new(RemoteBackend::new(base_url, *timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local() -> BackendConfig {
        BackendConfig::Local {
            max_entries: 10,
            cleanup_interval: 1,
        }
    }

    #[test]
    fn test_same_name_shares_backend() {
        let factory = BackendFactory::new();

        let a = factory.get_or_create("orders", &local()).unwrap();
        let b = factory.get_or_create("orders", &local()).unwrap();
        let c = factory.get_or_create("reports", &local()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn test_remote_shared_per_url() {
        let factory = BackendFactory::new();
        let config = BackendConfig::Remote {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout: Duration::from_secs(1),
        };

        let a = factory.get_or_create("one", &config).unwrap();
        let b = factory.get_or_create("two", &config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_remote_timeout_is_part_of_identity() {
        let factory = BackendFactory::new();
        let remote = |ms| BackendConfig::Remote {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout: Duration::from_millis(ms),
        };

        let fast = factory.get_or_create("orders", &remote(100)).unwrap();
        let slow = factory.get_or_create("orders", &remote(5000)).unwrap();
        let fast_again = factory.get_or_create("reports", &remote(100)).unwrap();

        assert!(!Arc::ptr_eq(&fast, &slow));
        assert!(Arc::ptr_eq(&fast, &fast_again));
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn test_configuration_errors_fail_fast() {
        let factory = BackendFactory::new();

        assert!(matches!(
            factory.get_or_create("", &local()),
            Err(CacheError::Config(_))
        ));

        let zero = BackendConfig::Local {
            max_entries: 0,
            cleanup_interval: 1,
        };
        assert!(matches!(
            factory.get_or_create("zero", &zero),
            Err(CacheError::Config(_))
        ));

        let bad_url = BackendConfig::Remote {
            base_url: "cache-server".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            factory.get_or_create("bad", &bad_url),
            Err(CacheError::Config(_))
        ));
        assert!(factory.is_empty());
    }
}
