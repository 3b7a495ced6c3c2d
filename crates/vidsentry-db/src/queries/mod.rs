//! Database query modules.

pub mod media_items;
