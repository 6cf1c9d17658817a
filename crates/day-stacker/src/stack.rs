//! Incremental day stacking.
//!
//! Every run rebuilds the composites for the days it discovers frames for
//! and merges the result with the previous manifest:
//!
//! - a day's time list is the union of discovered and recorded instants;
//! - when the previous run recorded instants that are not on disk any more,
//!   its composite is used as the base image and only unrecorded frames
//!   are folded on top, carrying the recorded frame count forward;
//! - tiles, days and layers that were not rediscovered are kept verbatim.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use image::{ImageFormat, RgbaImage};
use tracing::{debug, info, instrument, warn};
use wms_common::time::DAY_FORMAT;

use crate::composite::{load_rgba, stack_images, Compositor};
use crate::discovery::{discover_tiles, DayTiles, Frame, LayerDays};
use crate::error::{StackError, StackResult};
use crate::manifest::{DayEntry, LayerEntry, Manifest, TileEntry};

/// Inputs of one stacking run.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Root of the raw tile tree.
    pub input_dir: PathBuf,
    /// Where composites are written; manifest tile paths are relative to it.
    pub output_dir: PathBuf,
    /// Restrict to these layers. `None` or empty means all layers.
    pub layers: Option<BTreeSet<String>>,
    /// Previous manifest to merge with.
    pub existing_manifest: Option<PathBuf>,
}

impl StackConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            layers: None,
            existing_manifest: None,
        }
    }

    pub fn with_layers(mut self, layers: BTreeSet<String>) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn with_existing_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing_manifest = Some(path.into());
        self
    }
}

/// Output-relative path of a composite.
pub fn composite_path(layer: &str, date: NaiveDate, index: usize) -> String {
    format!("{}/{}/tile_{}.png", layer, date.format(DAY_FORMAT), index)
}

/// Build composites for everything under `config.input_dir` and return the
/// merged manifest. The manifest is not written.
pub fn build_day_stacks(config: &StackConfig) -> StackResult<Manifest> {
    let discovery = discover_tiles(&config.input_dir, config.layers.as_ref())?;

    let mut existing = config
        .existing_manifest
        .as_deref()
        .and_then(Manifest::load_existing);
    if let (Some(manifest), Some(filter)) = (existing.as_mut(), config.layers.as_ref()) {
        manifest.retain_layers(filter);
    }

    if discovery.is_empty() {
        return Ok(match existing {
            Some(previous) => {
                info!(
                    layers = previous.layers.len(),
                    "No new tiles, keeping existing manifest"
                );
                Manifest::new(previous.layers)
            }
            None => {
                warn!(input = %config.input_dir.display(), "No tiles found to stack");
                Manifest::new(Vec::new())
            }
        });
    }

    let mut previous_layers: BTreeMap<String, LayerEntry> = existing
        .map(|manifest| {
            manifest
                .layers
                .into_iter()
                .map(|layer| (layer.name.clone(), layer))
                .collect()
        })
        .unwrap_or_default();

    let mut layers = Vec::with_capacity(discovery.layers.len());
    for (name, days) in &discovery.layers {
        let previous = previous_layers.remove(name);
        layers.push(stack_layer(&config.output_dir, name, days, previous)?);
    }
    layers.extend(previous_layers.into_values());
    layers.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Manifest::new(layers))
}

#[instrument(skip(output_dir, days, previous), fields(days = days.len()))]
fn stack_layer(
    output_dir: &Path,
    layer: &str,
    days: &LayerDays,
    previous: Option<LayerEntry>,
) -> StackResult<LayerEntry> {
    let mut previous_days: BTreeMap<NaiveDate, DayEntry> = previous
        .into_iter()
        .flat_map(|entry| entry.days)
        .map(|day| (day.date, day))
        .collect();

    let mut out = Vec::with_capacity(days.len() + previous_days.len());
    for (date, tiles) in days {
        let previous_day = previous_days.remove(date);
        out.push(stack_day(output_dir, layer, *date, tiles, previous_day)?);
    }
    out.extend(previous_days.into_values());
    out.sort_by_key(|day| day.date);

    Ok(LayerEntry {
        name: layer.to_string(),
        days: out,
    })
}

fn stack_day(
    output_dir: &Path,
    layer: &str,
    date: NaiveDate,
    tiles: &DayTiles,
    previous: Option<DayEntry>,
) -> StackResult<DayEntry> {
    let discovered: BTreeSet<DateTime<Utc>> =
        tiles.values().flatten().map(|frame| frame.time).collect();
    let (recorded, mut previous_tiles): (BTreeSet<DateTime<Utc>>, BTreeMap<usize, TileEntry>) =
        match previous {
            Some(day) => (
                day.times.into_iter().collect(),
                day.tiles
                    .into_iter()
                    .map(|tile| (tile.index, tile))
                    .collect(),
            ),
            None => Default::default(),
        };

    let include_existing = recorded.iter().any(|time| !discovered.contains(time));
    let times: Vec<DateTime<Utc>> = discovered.union(&recorded).copied().collect();

    let mut out = Vec::with_capacity(tiles.len() + previous_tiles.len());
    for (&index, frames) in tiles {
        let previous_tile = previous_tiles.remove(&index);
        let base = previous_tile
            .filter(|_| include_existing)
            .filter(|tile| output_dir.join(&tile.path).is_file());

        let entry = match base {
            Some(tile) => {
                fold_onto_existing(output_dir, layer, date, index, frames, &recorded, tile)?
            }
            None => stack_from_scratch(output_dir, layer, date, index, frames)?,
        };
        out.push(entry);
    }
    out.extend(previous_tiles.into_values());
    out.sort_by_key(|tile| tile.index);

    info!(
        layer,
        date = %date,
        times = times.len(),
        tiles = out.len(),
        merged = include_existing,
        "Stacked day"
    );

    Ok(DayEntry {
        date,
        times,
        tiles: out,
    })
}

fn fold_onto_existing(
    output_dir: &Path,
    layer: &str,
    date: NaiveDate,
    index: usize,
    frames: &[Frame],
    recorded: &BTreeSet<DateTime<Utc>>,
    existing: TileEntry,
) -> StackResult<TileEntry> {
    let fresh: Vec<&Frame> = frames
        .iter()
        .filter(|frame| !recorded.contains(&frame.time))
        .collect();
    if fresh.is_empty() {
        debug!(layer, date = %date, index, "No unrecorded frames, keeping composite");
        return Ok(existing);
    }

    let base_path = output_dir.join(&existing.path);
    let mut compositor = Compositor::new(load_rgba(&base_path)?);
    for frame in &fresh {
        compositor.fold(&load_rgba(&frame.path)?, &frame.path)?;
    }

    let count = existing.count + fresh.len();
    debug!(layer, date = %date, index, added = fresh.len(), count, "Folded frames onto composite");
    write_composite(output_dir, layer, date, index, compositor.finish(), count)
}

fn stack_from_scratch(
    output_dir: &Path,
    layer: &str,
    date: NaiveDate,
    index: usize,
    frames: &[Frame],
) -> StackResult<TileEntry> {
    let paths: Vec<&Path> = frames.iter().map(|frame| frame.path.as_path()).collect();
    let image = stack_images(&paths)?;
    write_composite(output_dir, layer, date, index, image, frames.len())
}

fn write_composite(
    output_dir: &Path,
    layer: &str,
    date: NaiveDate,
    index: usize,
    image: RgbaImage,
    count: usize,
) -> StackResult<TileEntry> {
    let relative = composite_path(layer, date, index);
    let path = output_dir.join(&relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StackError::io(parent))?;
    }
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|source| StackError::Encode {
            path: path.clone(),
            source,
        })?;

    Ok(TileEntry {
        index,
        path: relative,
        width: image.width(),
        height: image.height(),
        count,
    })
}
