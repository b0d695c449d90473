//! Request and Response models for the cache server API
//!
//! DTOs serialized by the server and by the remote backend client.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ExpiryDto, LiveKeysRequest, PutEntryRequest};
pub use responses::{
    EntryResponse, ErrorResponse, HealthResponse, LiveKeysResponse, PutEntryResponse,
    RemoveResponse, StatsResponse,
};
