//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use tokio::sync::RwLock;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::cache::{CacheStore, Expiry};
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    EntryResponse, HealthResponse, LiveKeysRequest, LiveKeysResponse, PutEntryRequest,
    PutEntryResponse, RemoveResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe store
    pub store: Arc<RwLock<CacheStore>>,
}

impl AppState {
    /// Creates a new AppState around the given store.
    pub fn new(store: CacheStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Creates a new AppState sized from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(CacheStore::new(config.max_entries))
    }
}

/// Handler for PUT /entries
///
/// Stores a value if the request's write condition holds.
/// Answers 409 when the condition fails.
pub async fn put_entry_handler(
    State(state): State<AppState>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<PutEntryResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    let expiry = Expiry::try_from(req.expiry)?;

    let version = {
        let mut store = state.store.write().await;
        store.set(req.key.clone(), req.value, expiry, req.condition)?
    };
    debug!(key = %req.key, version, "Entry written");

    Ok(Json(PutEntryResponse {
        key: req.key,
        version,
    }))
}

/// Handler for GET /entries/:key
///
/// Returns the live value and its version, 404 if absent or expired.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryResponse>> {
    // Write lock: reads move sliding deadlines and LRU order
    let mut store = state.store.write().await;
    let found = store.get(&key)?;

    Ok(Json(EntryResponse {
        key,
        value: found.value,
        version: found.version,
    }))
}

/// Handler for DELETE /entries/:key
///
/// Idempotent: removing an absent key answers 200 with `removed: false`.
pub async fn remove_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<RemoveResponse> {
    let removed = state.store.write().await.delete(&key);
    Json(RemoveResponse { key, removed })
}

/// Handler for POST /keys/live
///
/// Reports which of the given keys hold a live value. Read-only: sliding
/// deadlines, recency and hit counters are left alone.
pub async fn live_keys_handler(
    State(state): State<AppState>,
    Json(req): Json<LiveKeysRequest>,
) -> Json<LiveKeysResponse> {
    let store = state.store.read().await;
    let live = req
        .keys
        .into_iter()
        .filter(|key| store.contains(key))
        .collect();
    Json(LiveKeysResponse { live })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let store = state.store.read().await;
    Json(StatsResponse::from(store.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
