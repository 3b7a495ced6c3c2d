//! vidsentry-core: shared types, IDs, errors, configuration, and event bus.
//!
//! This crate is the foundational dependency for the other vidsentry
//! crates. It provides type-safe identifiers, a unified error type, the
//! media status state machine, application configuration, and the
//! broadcast [`events::EventBus`].

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
