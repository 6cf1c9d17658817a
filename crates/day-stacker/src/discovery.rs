//! Scan the raw tile tree written by the downloader.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;
use wms_common::time::parse_instant_dir;
use wms_common::tile::parse_tile_index;

use crate::error::{StackError, StackResult};

/// One raw tile at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub time: DateTime<Utc>,
    pub path: PathBuf,
}

/// Frames per tile index.
pub type DayTiles = BTreeMap<usize, Vec<Frame>>;

/// Days per layer.
pub type LayerDays = BTreeMap<NaiveDate, DayTiles>;

/// Discovered frames grouped as layer -> day -> tile index -> frames.
///
/// Frames for one index are sorted by instant ascending.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub layers: BTreeMap<String, LayerDays>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.layers
            .values()
            .flat_map(|days| days.values())
            .flat_map(|tiles| tiles.values())
            .map(Vec::len)
            .sum()
    }

    fn insert(&mut self, layer: &str, time: DateTime<Utc>, index: usize, path: PathBuf) {
        self.layers
            .entry(layer.to_string())
            .or_default()
            .entry(time.date_naive())
            .or_default()
            .entry(index)
            .or_default()
            .push(Frame { time, path });
    }
}

fn layer_allowed(filter: Option<&BTreeSet<String>>, name: &str) -> bool {
    match filter {
        Some(allowed) if !allowed.is_empty() => allowed.contains(name),
        _ => true,
    }
}

/// Collect `<root>/<layer>/<YYYYMMDDTHHMMSSZ>/tile_<index>_*.png`.
///
/// Symlinked layer or instant directories are followed. Directories whose
/// names are not instants and files that are not tiles are skipped. An
/// empty or absent `layers` set means every layer.
pub fn discover_tiles(root: &Path, layers: Option<&BTreeSet<String>>) -> StackResult<Discovery> {
    let mut discovery = Discovery::default();

    if !root.is_dir() {
        warn!(root = %root.display(), "Input directory does not exist");
        return Ok(discovery);
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            match entry.depth() {
                1 => entry.file_type().is_dir() && layer_allowed(layers, &name),
                2 => entry.file_type().is_dir() && parse_instant_dir(&name).is_some(),
                _ => true,
            }
        });

    for entry in walker {
        let entry = entry.map_err(|source| StackError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.depth() != 3 || !entry.file_type().is_file() {
            continue;
        }

        let Some(index) = entry.file_name().to_str().and_then(parse_tile_index) else {
            continue;
        };
        let path = entry.path();
        let instant = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .and_then(parse_instant_dir);
        let layer = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|name| name.to_str());

        if let (Some(time), Some(layer)) = (instant, layer) {
            discovery.insert(layer, time, index, path.to_path_buf());
        }
    }

    for tiles in discovery.layers.values_mut().flat_map(BTreeMap::values_mut) {
        for frames in tiles.values_mut() {
            frames.sort_by_key(|frame| frame.time);
        }
    }

    debug!(
        layers = discovery.layers.len(),
        frames = discovery.frame_count(),
        "Discovered raw tiles"
    );
    Ok(discovery)
}
