//! HTTP middleware and extractors: request ID and caller identity.

pub mod owner;
pub mod request_id;
