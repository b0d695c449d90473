//! API Module
//!
//! HTTP handlers and routing for the cache server the remote backend talks to.
//!
//! # Endpoints
//! - `PUT /entries` - Store a value, optionally conditional
//! - `GET /entries/:key` - Retrieve a value and its version
//! - `DELETE /entries/:key` - Remove a key
//! - `POST /keys/live` - Check which keys hold a live value
//! - `GET /stats` - Store statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
