//! Cache Module
//!
//! Provides the in-memory key/value store shared by the local backend and the
//! cache server: versioned conditional writes, sliding/absolute expiration and
//! LRU eviction of volatile entries.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, duration_ms, CacheEntry, Expiry};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, Versioned, WriteCondition};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
