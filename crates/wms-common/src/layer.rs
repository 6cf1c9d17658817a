//! Layer metadata advertised by a WMS capabilities document.

use chrono::{DateTime, Utc};

use crate::BoundingBox;

/// One named layer from a capabilities document.
///
/// `times` is always sorted ascending and free of duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    /// Layer name used in GetMap requests; unique within a document
    pub name: String,

    /// Human-readable title (falls back to the name)
    pub title: String,

    /// Available instants
    pub times: Vec<DateTime<Utc>>,

    /// Preferred bounding box, if the layer advertises any
    pub bbox: Option<BoundingBox>,
}

impl LayerInfo {
    pub fn new(
        name: impl Into<String>,
        title: Option<String>,
        mut times: Vec<DateTime<Utc>>,
        bbox: Option<BoundingBox>,
    ) -> Self {
        let name = name.into();
        times.sort();
        times.dedup();
        Self {
            title: title.unwrap_or_else(|| name.clone()),
            name,
            times,
            bbox,
        }
    }

    pub fn has_times(&self) -> bool {
        !self.times.is_empty()
    }
}
