//! Background Tasks Module
//!
//! # Tasks
//! - TTL Cleanup: removes expired store entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
