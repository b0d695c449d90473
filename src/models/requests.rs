//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies. The remote backend
//! serializes the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::{duration_ms, Expiry, WriteCondition, MAX_KEY_LENGTH};
use crate::error::CacheError;

/// Wire form of an expiry policy.
///
/// At most one field may be set; an empty object means the entry never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryDto {
    /// Sliding window in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sliding_ms: Option<u64>,
    /// Absolute deadline (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_at: Option<DateTime<Utc>>,
}

impl From<Expiry> for ExpiryDto {
    fn from(expiry: Expiry) -> Self {
        match expiry {
            Expiry::Sliding(window) => Self {
                sliding_ms: Some(duration_ms(window)),
                absolute_at: None,
            },
            Expiry::Absolute(deadline) => Self {
                sliding_ms: None,
                absolute_at: Some(deadline),
            },
            Expiry::Never => Self::default(),
        }
    }
}

impl TryFrom<ExpiryDto> for Expiry {
    type Error = CacheError;

    fn try_from(dto: ExpiryDto) -> Result<Self, Self::Error> {
        match (dto.sliding_ms, dto.absolute_at) {
            (Some(_), Some(_)) => Err(CacheError::InvalidRequest(
                "Expiry cannot be both sliding and absolute".to_string(),
            )),
            (Some(0), None) => Err(CacheError::InvalidRequest(
                "Sliding expiry must be positive".to_string(),
            )),
            (Some(ms), None) => Ok(Expiry::Sliding(Duration::from_millis(ms))),
            (None, Some(deadline)) => Ok(Expiry::Absolute(deadline)),
            (None, None) => Ok(Expiry::Never),
        }
    }
}

/// Request body for PUT /entries
///
/// # Fields
/// - `key`: The key to store the value under
/// - `value`: The value to store
/// - `expiry`: Expiry policy, defaults to never expiring
/// - `condition`: Write precondition, defaults to unconditional overwrite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEntryRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub expiry: ExpiryDto,
    #[serde(default)]
    pub condition: WriteCondition,
}

/// Request body for POST /keys/live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveKeysRequest {
    pub keys: Vec<String>,
}

impl PutEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        if self.expiry.sliding_ms.is_some() && self.expiry.absolute_at.is_some() {
            return Some("Expiry cannot be both sliding and absolute".to_string());
        }
        None
    }
}
