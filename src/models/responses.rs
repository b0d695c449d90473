//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies. The remote backend
//! deserializes the same types.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

/// Response body for GET /entries/:key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: String,
    pub version: u64,
}

/// Response body for PUT /entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEntryResponse {
    pub key: String,
    /// Version assigned to the written value
    pub version: u64,
}

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub key: String,
    /// Whether a live entry was removed
    pub removed: bool,
}

/// Response body for POST /keys/live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveKeysResponse {
    /// Requested keys holding a live value, in request order
    pub live: Vec<String>,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub conflicts: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            conflicts: stats.conflicts,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}
