//! Configuration Module
//!
//! Loads server and cache configuration from environment variables.
//! Malformed values are configuration errors, never silently defaulted.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::index::{RegisterMode, DEFAULT_PRUNE_INTERVAL};

const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL: u64 = 1;
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_SLIDING_SECS: u64 = 300;
const DEFAULT_REGISTER_ATTEMPTS: u32 = 32;

/// Cache server configuration parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of entries the store can hold
    pub max_entries: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl ServerConfig {
    /// Loads the server configuration from the process environment.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum store entries (default: 1000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            max_entries: parse_var(&lookup, "MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?,
            server_port: parse_var(&lookup, "SERVER_PORT", 3000)?,
            cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL", DEFAULT_CLEANUP_INTERVAL)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Config("MAX_ENTRIES must be positive".to_string()));
        }
        if self.cleanup_interval == 0 {
            return Err(CacheError::Config(
                "CLEANUP_INTERVAL must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            server_port: 3000,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// Which store a cache runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// In-process store
    Local {
        max_entries: usize,
        cleanup_interval: u64,
    },
    /// Cache server reached over HTTP
    Remote { base_url: String, timeout: Duration },
}

/// Configuration of an `EntryCache`.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Identity of the cache; local caches with the same name share a store
    pub cache_name: String,
    pub backend: BackendConfig,
    /// Entity sets never cached nor invalidated
    pub ignored_entity_sets: Vec<String>,
    /// Expiry applied when a put names neither sliding nor absolute expiry
    pub default_sliding: Duration,
    pub register_mode: RegisterMode,
    /// Record length between checks for dependents whose values are gone
    pub prune_interval: usize,
}

impl CacheSettings {
    /// Loads cache settings from the process environment.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - cache identity (default: "default")
    /// - `CACHE_BACKEND` - `local` or `remote` (default: local)
    /// - `CACHE_REMOTE_URL` - server base URL, required for remote
    /// - `CACHE_REMOTE_TIMEOUT_MS` - per-request timeout (default: 2000)
    /// - `MAX_ENTRIES`, `CLEANUP_INTERVAL` - local store sizing
    /// - `IGNORED_ENTITY_SETS` - comma-separated entity set names
    /// - `DEFAULT_SLIDING_SECS` - default sliding expiry (default: 300)
    /// - `REGISTER_MODE` - `optimistic` or `best_effort` (default: optimistic)
    /// - `REGISTER_MAX_ATTEMPTS` - optimistic retry budget (default: 32)
    /// - `DEPENDENCY_PRUNE_INTERVAL` - record length between dead-key checks (default: 1024)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_kind = lookup("CACHE_BACKEND").unwrap_or_else(|| "local".to_string());
        let backend = match backend_kind.trim().to_ascii_lowercase().as_str() {
            "local" => BackendConfig::Local {
                max_entries: parse_var(&lookup, "MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?,
                cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL", DEFAULT_CLEANUP_INTERVAL)?,
            },
            "remote" => BackendConfig::Remote {
                base_url: lookup("CACHE_REMOTE_URL").ok_or_else(|| {
                    CacheError::Config("CACHE_REMOTE_URL is required for the remote backend".to_string())
                })?,
                timeout: Duration::from_millis(parse_var(
                    &lookup,
                    "CACHE_REMOTE_TIMEOUT_MS",
                    DEFAULT_REMOTE_TIMEOUT_MS,
                )?),
            },
            other => {
                return Err(CacheError::Config(format!(
                    "Unknown CACHE_BACKEND '{}', expected 'local' or 'remote'",
                    other
                )))
            }
        };

        let max_attempts = parse_var(&lookup, "REGISTER_MAX_ATTEMPTS", DEFAULT_REGISTER_ATTEMPTS)?;
        let register_mode = match lookup("REGISTER_MODE")
            .unwrap_or_else(|| "optimistic".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "optimistic" => RegisterMode::Optimistic { max_attempts },
            "best_effort" => RegisterMode::BestEffort,
            other => {
                return Err(CacheError::Config(format!(
                    "Unknown REGISTER_MODE '{}', expected 'optimistic' or 'best_effort'",
                    other
                )))
            }
        };

        let ignored_entity_sets = lookup("IGNORED_ENTITY_SETS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let settings = Self {
            cache_name: lookup("CACHE_NAME").unwrap_or_else(|| "default".to_string()),
            backend,
            ignored_entity_sets,
            default_sliding: Duration::from_secs(parse_var(
                &lookup,
                "DEFAULT_SLIDING_SECS",
                DEFAULT_SLIDING_SECS,
            )?),
            register_mode,
            prune_interval: parse_var(&lookup, "DEPENDENCY_PRUNE_INTERVAL", DEFAULT_PRUNE_INTERVAL)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Settings for an in-process cache with defaults everywhere else.
    pub fn local(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    /// Settings for a cache backed by the server at `base_url`.
    pub fn remote(cache_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            backend: BackendConfig::Remote {
                base_url: base_url.into(),
                timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            },
            ..Self::default()
        }
    }

    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_entity_sets = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_register_mode(mut self, mode: RegisterMode) -> Self {
        self.register_mode = mode;
        self
    }

    pub fn with_prune_interval(mut self, interval: usize) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Rejects settings no backend could run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(CacheError::Config("CACHE_NAME cannot be empty".to_string()));
        }
        match &self.backend {
            BackendConfig::Local {
                max_entries,
                cleanup_interval,
            } => {
                if *max_entries == 0 {
                    return Err(CacheError::Config("MAX_ENTRIES must be positive".to_string()));
                }
                if *cleanup_interval == 0 {
                    return Err(CacheError::Config(
                        "CLEANUP_INTERVAL must be positive".to_string(),
                    ));
                }
            }
            BackendConfig::Remote { base_url, timeout } => {
                if base_url.trim().is_empty() {
                    return Err(CacheError::Config("CACHE_REMOTE_URL cannot be empty".to_string()));
                }
                if timeout.is_zero() {
                    return Err(CacheError::Config(
                        "CACHE_REMOTE_TIMEOUT_MS must be positive".to_string(),
                    ));
                }
            }
        }
        if self.default_sliding.is_zero() {
            return Err(CacheError::Config(
                "DEFAULT_SLIDING_SECS must be positive".to_string(),
            ));
        }
        if let RegisterMode::Optimistic { max_attempts: 0 } = self.register_mode {
            return Err(CacheError::Config(
                "REGISTER_MAX_ATTEMPTS must be positive".to_string(),
            ));
        }
        if self.prune_interval == 0 {
            return Err(CacheError::Config(
                "DEPENDENCY_PRUNE_INTERVAL must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_name: "default".to_string(),
            backend: BackendConfig::Local {
                max_entries: DEFAULT_MAX_ENTRIES,
                cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            },
            ignored_entity_sets: Vec::new(),
            default_sliding: Duration::from_secs(DEFAULT_SLIDING_SECS),
            register_mode: RegisterMode::Optimistic {
                max_attempts: DEFAULT_REGISTER_ATTEMPTS,
            },
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        }
    }
}

/// Parses `name` if set, else returns `default`.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CacheError::Config(format!("Invalid {}='{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
    }

    #[test]
    fn test_server_config_rejects_garbage() {
        let result = ServerConfig::from_lookup(vars(&[("SERVER_PORT", "eighty")]));
        assert!(matches!(result, Err(CacheError::Config(_))));

        let result = ServerConfig::from_lookup(vars(&[("MAX_ENTRIES", "0")]));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::from_lookup(vars(&[])).unwrap();
        assert_eq!(settings.cache_name, "default");
        assert!(matches!(settings.backend, BackendConfig::Local { max_entries: 1000, .. }));
        assert!(settings.ignored_entity_sets.is_empty());
        assert_eq!(settings.default_sliding, Duration::from_secs(300));
        assert_eq!(settings.register_mode, RegisterMode::Optimistic { max_attempts: 32 });
        assert_eq!(settings.prune_interval, 1024);
    }

    #[test]
    fn test_cache_settings_remote() {
        let settings = CacheSettings::from_lookup(vars(&[
            ("CACHE_BACKEND", "Remote"),
            ("CACHE_REMOTE_URL", "http://cache:3000"),
            ("CACHE_REMOTE_TIMEOUT_MS", "250"),
            ("IGNORED_ENTITY_SETS", " AuditLog, ,Sessions "),
            ("REGISTER_MODE", "best_effort"),
            ("DEPENDENCY_PRUNE_INTERVAL", "256"),
        ]))
        .unwrap();

        assert_eq!(
            settings.backend,
            BackendConfig::Remote {
                base_url: "http://cache:3000".to_string(),
                timeout: Duration::from_millis(250),
            }
        );
        assert_eq!(settings.ignored_entity_sets, vec!["AuditLog", "Sessions"]);
        assert_eq!(settings.register_mode, RegisterMode::BestEffort);
        assert_eq!(settings.prune_interval, 256);
    }

    #[test]
    fn test_cache_settings_fail_fast() {
        let cases: Vec<Vec<(&str, &str)>> = vec![
            vec![("CACHE_BACKEND", "remote")],
            vec![("CACHE_BACKEND", "memcached")],
            vec![("CACHE_BACKEND", "remote"), ("CACHE_REMOTE_URL", " ")],
            vec![("REGISTER_MODE", "pessimistic")],
            vec![("REGISTER_MAX_ATTEMPTS", "0")],
            vec![("DEPENDENCY_PRUNE_INTERVAL", "0")],
            vec![("DEFAULT_SLIDING_SECS", "-5")],
            vec![("CACHE_NAME", "")],
        ];

        for case in cases {
            let result = CacheSettings::from_lookup(vars(&case));
            assert!(
                matches!(result, Err(CacheError::Config(_))),
                "{:?} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_builders() {
        let settings = CacheSettings::local("reports")
            .with_ignored(["AuditLog"])
            .with_register_mode(RegisterMode::BestEffort)
            .with_prune_interval(16);

        assert_eq!(settings.cache_name, "reports");
        assert_eq!(settings.prune_interval, 16);
        assert_eq!(settings.ignored_entity_sets, vec!["AuditLog".to_string()]);
        assert!(settings.validate().is_ok());
    }
}
