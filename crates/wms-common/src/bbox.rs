//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// Projection used by the radar service for its native tiles.
pub const HOME_CRS: &str = "EPSG:3575";

/// A projected or geographic bounding box tagged with its CRS.
///
/// Field names serialize as `minx`/`miny`/`maxx`/`maxy` to match the WMS
/// attribute names used in capabilities documents and tile configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default = "default_crs")]
    pub crs: String,
    #[serde(rename = "minx")]
    pub min_x: f64,
    #[serde(rename = "miny")]
    pub min_y: f64,
    #[serde(rename = "maxx")]
    pub max_x: f64,
    #[serde(rename = "maxy")]
    pub max_y: f64,
}

fn default_crs() -> String {
    HOME_CRS.to_string()
}

impl BoundingBox {
    /// Create a new bounding box from a CRS and corner coordinates.
    pub fn new(crs: impl Into<String>, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            crs: crs.into(),
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Format as a WMS BBOX parameter value.
    pub fn to_wms_string(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Case-insensitive CRS comparison ("epsg:3575" == "EPSG:3575").
    pub fn has_crs(&self, crs: &str) -> bool {
        self.crs.eq_ignore_ascii_case(crs)
    }

    /// Check whether `other` lies entirely within this bbox (edges inclusive).
    /// CRS is not compared.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),

    #[error("Missing BBOX attribute: {0}")]
    MissingAttribute(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wms_string_format() {
        let bbox = BoundingBox::new("EPSG:3575", -1.5, 2.0, 3.25, 4.0);
        assert_eq!(bbox.to_wms_string(), "-1.5,2,3.25,4");
    }

    #[test]
    fn test_contains() {
        let outer = BoundingBox::new(HOME_CRS, 0.0, 0.0, 10.0, 10.0);
        let inner = BoundingBox::new(HOME_CRS, 2.0, 2.0, 10.0, 8.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_serde_uses_wms_names() {
        let bbox: BoundingBox =
            serde_json::from_str(r#"{"minx": 1, "miny": 2, "maxx": 3, "maxy": 4}"#).unwrap();
        assert_eq!(bbox.crs, HOME_CRS);
        assert_eq!(bbox.width(), 2.0);
        assert_eq!(bbox.height(), 2.0);
    }
}
