//! Query Fingerprint Module
//!
//! Maps raw query text to a fixed-length cache key.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in characters (hex-encoded SHA-256).
pub const FINGERPRINT_LEN: usize = 64;

/// Computes the cache key of a query as a SHA-256 hex digest.
///
/// No salt is mixed in, so the same text maps to the same key in every
/// process and across restarts.
#[must_use]
pub fn fingerprint(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}
