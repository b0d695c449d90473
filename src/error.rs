//! Error types for the entity cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the store, the backends and the orchestrator.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in the store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Store is full and nothing could be evicted
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// A conditional write lost against a concurrent writer
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Transient backend failure (timeout, unreachable store, 5xx)
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true for failures a caller may retry or simply ignore.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::Backend(_) | CacheError::VersionConflict(_) | CacheError::CacheFull(_)
        )
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CacheError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            CacheError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            CacheError::Serialization(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            CacheError::CacheFull(msg) | CacheError::Backend(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            CacheError::VersionConflict(msg) => (StatusCode::CONFLICT, msg),
            CacheError::Config(msg) | CacheError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the entity cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::Backend("timeout".into()).is_transient());
        assert!(CacheError::VersionConflict("k".into()).is_transient());
        assert!(!CacheError::Config("missing url".into()).is_transient());
        assert!(!CacheError::InvalidRequest("empty".into()).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        let resp = CacheError::VersionConflict("k".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = CacheError::NotFound("k".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::CacheFull("full".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
