//! vidsentry-db: the durable item store.
//!
//! SQLite-backed storage with connection pooling, embedded migrations, the
//! [`models::MediaItem`] model and the queries that enforce the media
//! status DAG.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
