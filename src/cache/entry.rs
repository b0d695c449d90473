//! Cache Entry Module
//!
//! Defines the structure for individual store entries and their expiry policy.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

// == Expiry ==
/// Expiration policy of a stored entry. Exactly one policy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Deadline moves forward by this duration on every successful read
    Sliding(Duration),
    /// Fixed wall-clock deadline
    Absolute(DateTime<Utc>),
    /// Never expires and is never evicted
    Never,
}

impl Expiry {
    // == Resolve ==
    /// Picks a single policy from optional sliding/absolute settings.
    ///
    /// Sliding takes precedence over absolute. Returns None when neither is set.
    pub fn resolve(sliding: Option<Duration>, absolute: Option<DateTime<Utc>>) -> Option<Self> {
        match (sliding, absolute) {
            (Some(window), _) => Some(Expiry::Sliding(window)),
            (None, Some(deadline)) => Some(Expiry::Absolute(deadline)),
            (None, None) => None,
        }
    }

    /// Deadline in Unix milliseconds measured from `now`, or None for `Never`.
    fn deadline_ms(&self, now: u64) -> Option<u64> {
        match self {
            Expiry::Sliding(window) => Some(now.saturating_add(duration_ms(*window))),
            Expiry::Absolute(deadline) => Some(deadline.timestamp_millis().max(0) as u64),
            Expiry::Never => None,
        }
    }
}

// == Cache Entry ==
/// Represents a single store entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: String,
    /// Store-wide version assigned on write
    pub version: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Sliding window in milliseconds, set only for sliding entries
    pub sliding_ms: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry under the given expiry policy.
    pub fn new(value: String, version: u64, expiry: Expiry) -> Self {
        let now = current_timestamp_ms();
        let sliding_ms = match expiry {
            Expiry::Sliding(window) => Some(duration_ms(window)),
            _ => None,
        };

        Self {
            value,
            version,
            created_at: now,
            expires_at: expiry.deadline_ms(now),
            sliding_ms,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its deadline.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`is_expired`](Self::is_expired) against a caller-supplied clock.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Touch ==
    /// Pushes the deadline of a sliding entry forward. No-op for other policies.
    pub fn touch(&mut self) {
        if let Some(window) = self.sliding_ms {
            self.expires_at = Some(current_timestamp_ms().saturating_add(window));
        }
    }

    /// True when the entry carries a deadline and may be evicted under pressure.
    pub fn is_volatile(&self) -> bool {
        self.expires_at.is_some()
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has a deadline in the future
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Whole milliseconds in `window`, rounded up and saturating at `u64::MAX`.
///
/// A non-zero window never maps to zero, which would expire the entry at once.
pub fn duration_ms(window: Duration) -> u64 {
    let partial = u128::from(window.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(window.as_millis() + partial).unwrap_or(u64::MAX)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
