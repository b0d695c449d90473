//! Entity Cache - query-result caching with entity-set invalidation
//!
//! Stores query results under a fingerprint of the query text and removes
//! them when an entity set they depend on changes. Runs over an in-process
//! store or over a cache server reached via HTTP; the server itself is
//! provided by the `entity-cache-server` binary.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod entry_cache;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use backend::{Backend, BackendFactory, LocalBackend, RemoteBackend};
pub use config::{BackendConfig, CacheSettings, ServerConfig};
pub use entry_cache::{EntryCache, PutOutcome, ResultSet, SkipReason};
pub use error::{CacheError, Result};
pub use fingerprint::fingerprint;
pub use index::{DependencyIndex, EntitySetName, RegisterMode};
pub use tasks::spawn_cleanup_task;
