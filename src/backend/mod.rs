//! Backend Module
//!
//! Minimal key/value capability the dependency index and the orchestrator are
//! written against, plus its two implementations:
//! - `LocalBackend` - in-process store, every operation atomic per key
//! - `RemoteBackend` - HTTP client to a cache server, operations can fail
//!   transiently and read-modify-write needs write conditions to be safe

mod factory;
mod local;
mod remote;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::cache::{Expiry, Versioned, WriteCondition};
use crate::error::Result;

pub use factory::BackendFactory;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

// == Backend Trait ==
/// Key/value operations a store must provide.
///
/// Writing an existing key with `WriteCondition::Always` overwrites it in
/// every implementation; conditional writes report a lost race as
/// `CacheError::VersionConflict`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identity used in log lines.
    fn name(&self) -> &str;

    /// Reads a live value and its version. `Ok(None)` means not found.
    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>>;

    /// Writes `value` under `key` if `condition` holds and returns the new version.
    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;

    /// The subset of `keys` currently holding a live value.
    ///
    /// A pure lookup: it neither restarts sliding windows nor counts as a hit.
    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>>;
}
