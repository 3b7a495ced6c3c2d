//! vidsentry - media upload, moderation pipeline and range-aware delivery
//!
//! This library crate exposes the server internals for integration testing.

pub mod error;
pub mod ingest;
pub mod middleware;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod streaming;
