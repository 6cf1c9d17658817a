//! Common types and utilities shared across the radar-history stages.

pub mod bbox;
pub mod error;
pub mod layer;
pub mod tile;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{WmsError, WmsResult};
pub use layer::LayerInfo;
pub use tile::{resolve_tiles, TileConfig, TileRequest};
pub use time::{TimeInterval, TimeParseError};
