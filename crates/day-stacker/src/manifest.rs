//! The JSON index of stacked tiles consumed by the viewer.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wms_common::time::{serde_instant, serde_instant_list};

use crate::error::{StackError, StackResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(with = "serde_instant")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub name: String,
    #[serde(default)]
    pub days: Vec<DayEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayEntry {
    pub date: NaiveDate,
    /// Instants folded into this day's composites, ascending.
    #[serde(with = "serde_instant_list", default)]
    pub times: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub tiles: Vec<TileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    pub index: usize,
    /// Output-relative, `/`-separated path of the composite.
    #[serde(alias = "relative_path")]
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Number of frames that contributed to the composite.
    pub count: usize,
}

impl Manifest {
    pub fn new(layers: Vec<LayerEntry>) -> Self {
        Self {
            generated_at: Utc::now(),
            layers,
        }
    }

    pub fn layer(&self, name: &str) -> Option<&LayerEntry> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn load(path: &Path) -> StackResult<Self> {
        let text = fs::read_to_string(path).map_err(StackError::io(path))?;
        serde_json::from_str(&text).map_err(|source| StackError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a previous manifest for merging.
    ///
    /// A missing file is `None`. An unreadable or malformed file is logged
    /// and also treated as `None`.
    pub fn load_existing(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No existing manifest");
            return None;
        }
        match Self::load(path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
                None
            }
        }
    }

    /// Write pretty-printed JSON, creating the parent directory.
    pub fn write(&self, path: &Path) -> StackResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StackError::io(parent))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| StackError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(StackError::io(path))
    }

    /// Drop layers not in `names`. An empty set keeps everything.
    pub fn retain_layers(&mut self, names: &BTreeSet<String>) {
        if names.is_empty() {
            return;
        }
        self.layers.retain(|layer| names.contains(&layer.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        Manifest {
            generated_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            layers: vec![LayerEntry {
                name: "prectype".to_string(),
                days: vec![DayEntry {
                    date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                    times: vec![Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap()],
                    tiles: vec![TileEntry {
                        index: 0,
                        path: "prectype/2025-01-01/tile_0.png".to_string(),
                        width: 512,
                        height: 512,
                        count: 1,
                    }],
                }],
            }],
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["generated_at"], "2025-01-02T03:04:05Z");
        let day = &json["layers"][0]["days"][0];
        assert_eq!(day["date"], "2025-01-01");
        assert_eq!(day["times"][0], "2025-01-01T06:00:00Z");
        assert_eq!(day["tiles"][0]["path"], "prectype/2025-01-01/tile_0.png");
        assert_eq!(day["tiles"][0]["count"], 1);
    }

    #[test]
    fn test_accepts_relative_path_key() {
        let json = r#"{
            "generated_at": "2025-01-02T03:04:05Z",
            "layers": [{"name": "prectype", "days": [{
                "date": "2025-01-01",
                "times": ["2025-01-01T06:00:00Z"],
                "tiles": [{"index": 0, "relative_path": "prectype/2025-01-01/tile_0.png",
                           "width": 512, "height": 512, "count": 1}]
            }]}]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest, sample());
    }

    #[test]
    fn test_write_then_load_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("manifest.json");
        sample().write(&path).unwrap();
        assert_eq!(Manifest::load_existing(&path), Some(sample()));
    }

    #[test]
    fn test_malformed_manifest_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Manifest::load(&path).is_err());
        assert_eq!(Manifest::load_existing(&path), None);
        let missing = dir.path().join("missing.json");
        assert_eq!(Manifest::load_existing(&missing), None);
    }

    #[test]
    fn test_retain_layers() {
        let mut manifest = sample();
        manifest.layers.push(LayerEntry {
            name: "other".to_string(),
            days: Vec::new(),
        });
        manifest.retain_layers(&BTreeSet::new());
        assert_eq!(manifest.layers.len(), 2);
        manifest.retain_layers(&["prectype".to_string()].into());
        assert_eq!(manifest.layers.len(), 1);
        assert!(manifest.layer("other").is_none());
    }
}
