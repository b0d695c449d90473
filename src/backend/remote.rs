//! Remote Backend
//!
//! HTTP client for a cache server exposing the `/entries` API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::backend::Backend;
use crate::cache::{Expiry, Versioned, WriteCondition};
use crate::error::{CacheError, Result};
use crate::models::{
    EntryResponse, ErrorResponse, HealthResponse, LiveKeysRequest, LiveKeysResponse,
    PutEntryRequest, PutEntryResponse, RemoveResponse, StatsResponse,
};

/// Backend talking to a cache server over HTTP.
///
/// Transport failures, timeouts and 5xx answers surface as
/// `CacheError::Backend`. The server provides no multi-key atomicity;
/// read-modify-write callers must use write conditions.
#[derive(Clone, Debug)]
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: Url,
    name: String,
}

impl RemoteBackend {
    /// Creates a client for the server at `base_url`.
    ///
    /// Fails with `CacheError::Config` if the URL is not an absolute http(s)
    /// URL or the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| CacheError::Config(format!("Invalid remote URL '{}': {}", base_url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "Remote URL must be an http(s) base URL, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name: format!("remote({})", parsed),
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `<base>/<segments...>` with each segment percent-encoded.
    fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Calls GET /health on the server.
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.url_for(&["health"])?).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Calls GET /stats on the server.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let response = self.client.get(self.url_for(&["stats"])?).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        let response = self
            .client
            .get(self.url_for(&["entries", key])?)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let entry: EntryResponse = response.json().await?;
                Ok(Some(Versioned {
                    value: entry.value,
                    version: entry.version,
                }))
            }
            _ => Err(error_from_response(response).await),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiry: Expiry,
        condition: WriteCondition,
    ) -> Result<u64> {
        let request = PutEntryRequest {
            key: key.to_string(),
            value,
            expiry: expiry.into(),
            condition,
        };

        let response = self
            .client
            .put(self.url_for(&["entries"])?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let written: PutEntryResponse = response.json().await?;
        Ok(written.version)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url_for(&["entries", key])?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let removed: RemoveResponse = response.json().await?;
        debug!(key = %removed.key, removed = removed.removed, "remote remove");
        Ok(())
    }

    async fn live_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request = LiveKeysRequest {
            keys: keys.to_vec(),
        };
        let response = self
            .client
            .post(self.url_for(&["keys", "live"])?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let found: LiveKeysResponse = response.json().await?;
        Ok(found.live)
    }
}

/// Maps a non-success response onto the error taxonomy.
async fn error_from_response(response: reqwest::Response) -> CacheError {
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };

    match status {
        StatusCode::CONFLICT => CacheError::VersionConflict(message),
        StatusCode::BAD_REQUEST => CacheError::InvalidRequest(message),
        StatusCode::NOT_FOUND => CacheError::NotFound(message),
        s if s.is_server_error() => CacheError::Backend(message),
        _ => CacheError::Internal(format!("{}: {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> RemoteBackend {
        RemoteBackend::new(url, Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_urls() {
        for url in ["", "not a url", "ftp://cache.local", "mailto:ops@example.com"] {
            let result = RemoteBackend::new(url, Duration::from_secs(1));
            assert!(
                matches!(result, Err(CacheError::Config(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_entry_url_encodes_key() {
        let remote = backend("http://cache.local:3000/api/");
        let url = remote
            .url_for(&["entries", "dependent_entity_set_order lines"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://cache.local:3000/api/entries/dependent_entity_set_order%20lines"
        );

        let url = remote.url_for(&["entries", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://cache.local:3000/api/entries/a%2Fb");
    }

    #[test]
    fn test_name_mentions_url() {
        let remote = backend("http://127.0.0.1:3000");
        assert!(remote.name().contains("127.0.0.1:3000"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Nothing listens on port 1
        let remote = backend("http://127.0.0.1:1");

        let result = remote.get("k").await;
        assert!(matches!(result, Err(CacheError::Backend(_))));

        let result = remote
            .put("k", "v".into(), Expiry::Never, WriteCondition::Always)
            .await;
        assert!(result.unwrap_err().is_transient());
    }
}
