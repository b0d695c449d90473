//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    get_entry_handler, health_handler, live_keys_handler, put_entry_handler,
    remove_entry_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /entries` - Store a value, optionally conditional
/// - `GET /entries/:key` - Retrieve a value and its version
/// - `DELETE /entries/:key` - Remove a key (idempotent)
/// - `POST /keys/live` - Which of the given keys hold a live value
/// - `GET /stats` - Store statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/entries", put(put_entry_handler))
        .route(
            "/entries/:key",
            get(get_entry_handler).delete(remove_entry_handler),
        )
        .route("/keys/live", post(live_keys_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        create_router(AppState::new(CacheStore::new(100)))
    }

    async fn send(method: &str, uri: &str, body: Option<&str>) -> StatusCode {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        create_test_app()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_entries_methods() {
        assert_eq!(send("PUT", "/entries", Some(r#"{"key":"k","value":"v"}"#)).await, StatusCode::OK);
        assert_eq!(send("POST", "/entries", Some(r#"{"key":"k","value":"v"}"#)).await, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(send("GET", "/entries/k", None).await, StatusCode::NOT_FOUND);
        assert_eq!(send("DELETE", "/entries/k", None).await, StatusCode::OK);
        assert_eq!(send("PUT", "/entries/k", None).await, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_live_keys_route() {
        assert_eq!(send("POST", "/keys/live", Some(r#"{"keys":["a"]}"#)).await, StatusCode::OK);
        assert_eq!(send("GET", "/keys/live", None).await, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(send("GET", "/get/k", None).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let status = send("PUT", "/entries", Some(r#"{"key":"k"}"#)).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_percent_encoded_key_round_trip() {
        let app = create_test_app();
        let put = Request::builder()
            .method("PUT")
            .uri("/entries")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"key":"a/b c","value":"v"}"#))
            .unwrap();
        assert_eq!(app.clone().oneshot(put).await.unwrap().status(), StatusCode::OK);

        let get = Request::builder()
            .uri("/entries/a%2Fb%20c")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(get).await.unwrap().status(), StatusCode::OK);
    }
}
