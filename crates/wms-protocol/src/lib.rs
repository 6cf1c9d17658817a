//! OGC WMS protocol support for the radar downloader.
//!
//! Supports:
//! - GetCapabilities parsing (WMS 1.1.1 `Extent`/`SRS` and 1.3.0 `Dimension`/`CRS`)
//! - GetMap URL construction (WMS 1.1.1 KVP)

pub mod capabilities;
pub mod getmap;

pub use capabilities::{parse_capabilities, CapabilitiesError};
pub use getmap::{build_getmap_url, GetMapRequest};
