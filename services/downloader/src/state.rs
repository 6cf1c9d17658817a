//! Per-layer download watermarks persisted as JSON.
//!
//! The file maps layer name to the last instant whose tiles were all on
//! disk, e.g. `{"prectype": "2025-01-01T06:00:00Z"}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;
use wms_common::time::{format_instant, parse_instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    last_times: BTreeMap<String, DateTime<Utc>>,
}

impl State {
    /// Load the state file; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No state file, starting fresh");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;

        let mut last_times = BTreeMap::new();
        for (layer, value) in raw {
            let time = parse_instant(&value).with_context(|| {
                format!("Invalid time for layer {} in {}", layer, path.display())
            })?;
            last_times.insert(layer, time);
        }
        Ok(Self { last_times })
    }

    /// Write the state as sorted, pretty-printed JSON via a temporary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let raw: BTreeMap<&str, String> = self
            .last_times
            .iter()
            .map(|(layer, time)| (layer.as_str(), format_instant(time)))
            .collect();
        let json = serde_json::to_string_pretty(&raw)?;

        let temp = path.with_extension("json.part");
        fs::write(&temp, json).with_context(|| format!("Failed to write {}", temp.display()))?;
        fs::rename(&temp, path)
            .with_context(|| format!("Failed to move state file into {}", path.display()))?;
        Ok(())
    }

    pub fn latest_for(&self, layer: &str) -> Option<DateTime<Utc>> {
        self.last_times.get(layer).copied()
    }

    /// Record `time` for `layer`. Older values never replace newer ones.
    pub fn update(&mut self, layer: &str, time: DateTime<Utc>) {
        match self.last_times.get_mut(layer) {
            Some(current) if *current >= time => {}
            Some(current) => *current = time,
            None => {
                self.last_times.insert(layer.to_string(), time);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.last_times.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_utils::utc;

    #[test]
    fn test_update_never_moves_backwards() {
        let mut state = State::default();
        let times = [
            utc(2025, 1, 1, 6, 0),
            utc(2025, 1, 1, 4, 0),
            utc(2025, 1, 1, 9, 0),
            utc(2025, 1, 1, 9, 0),
            utc(2024, 12, 31, 23, 0),
        ];

        let mut previous = None;
        for time in times {
            state.update("prectype", time);
            let latest = state.latest_for("prectype");
            assert!(latest >= previous);
            previous = latest;
        }
        assert_eq!(state.latest_for("prectype"), Some(utc(2025, 1, 1, 9, 0)));
        assert_eq!(state.latest_for("other"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = State::default();
        state.update("reflectivity", utc(2025, 1, 1, 6, 5));
        state.update("prectype", utc(2025, 1, 1, 6, 0));
        state.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            serde_json::json!({
                "prectype": "2025-01-01T06:00:00Z",
                "reflectivity": "2025-01-01T06:05:00Z"
            })
        );
        assert_eq!(State::load(&path).unwrap(), state);
        assert!(!path.with_extension("json.part").exists());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = State::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_offsets_are_normalised_to_utc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"prectype": "2025-01-01T07:00:00+01:00"}"#).unwrap();
        let state = State::load(&path).unwrap();
        assert_eq!(state.latest_for("prectype"), Some(utc(2025, 1, 1, 6, 0)));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(State::load(&path).is_err());
    }
}
