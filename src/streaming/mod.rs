//! Content delivery with HTTP range support.

pub mod delivery;
pub mod range;

pub use delivery::{open, open_path, Delivery};
pub use range::{parse_range_header, resolve, ByteRange, RangeSpec};
