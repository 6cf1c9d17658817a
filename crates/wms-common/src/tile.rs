//! Tile configuration and resolution of a layer into GetMap tile requests.
//!
//! The position of a tile in the resolved list is its identity everywhere
//! downstream: raw tiles on disk are named `tile_<index>_...` and stacked
//! composites `tile_<index>.png`. Resolution is therefore deterministic for
//! a given layer bbox and configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bbox::HOME_CRS;
use crate::{BoundingBox, LayerInfo, WmsError, WmsResult};

pub const DEFAULT_TILE_WIDTH: u32 = 512;
pub const DEFAULT_TILE_HEIGHT: u32 = 512;

/// Extent of the home region (Denmark) in the home projection.
pub fn home_bbox() -> BoundingBox {
    BoundingBox::new(
        HOME_CRS,
        -132_072.7784,
        -3_912_803.2510,
        360_255.4228,
        -3_547_098.2575,
    )
}

/// One GetMap request: a footprint and its pixel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRequest {
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
}

impl TileRequest {
    pub fn new(bbox: BoundingBox, width: u32, height: u32) -> Self {
        Self {
            bbox,
            width,
            height,
        }
    }

    /// File name of this tile inside an instant directory.
    pub fn file_name(&self, index: usize) -> String {
        format!(
            "tile_{}_{}_{}_{}_{}.png",
            index, self.bbox.min_x, self.bbox.min_y, self.bbox.max_x, self.bbox.max_y
        )
    }
}

/// Extract the tile index from a raw tile file name (`tile_<index>_<...>.png`).
pub fn parse_tile_index(file_name: &str) -> Option<usize> {
    let rest = file_name.strip_prefix("tile_")?.strip_suffix(".png")?;
    let (index, _) = rest.split_once('_')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

/// How a layer is cut into tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(default = "default_tile_width")]
    pub tile_width: u32,

    #[serde(default = "default_tile_height")]
    pub tile_height: u32,

    /// Ground units per pixel; enables grid tiling of the layer extent
    #[serde(default)]
    pub resolution: Option<f64>,

    /// Explicit tile footprints; overrides everything else when non-empty
    #[serde(default)]
    pub bboxes: Option<Vec<BoundingBox>>,

    /// Tile the home region instead of the whole layer when the layer
    /// extent (in the home CRS) fully contains it
    #[serde(default)]
    pub prefer_home_extent: bool,
}

fn default_tile_width() -> u32 {
    DEFAULT_TILE_WIDTH
}

fn default_tile_height() -> u32 {
    DEFAULT_TILE_HEIGHT
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            resolution: None,
            bboxes: None,
            prefer_home_extent: false,
        }
    }
}

impl TileConfig {
    /// Load a tile configuration file, or the defaults when `path` is `None`.
    ///
    /// `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn load(path: Option<&Path>) -> WmsResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| WmsError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        let config: TileConfig = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        config.validate()?;
        debug!(path = %path.display(), ?config, "Loaded tile config");
        Ok(config)
    }

    fn validate(&self) -> WmsResult<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(WmsError::InvalidTileConfig(format!(
                "tile size must be positive, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        if let Some(resolution) = self.resolution {
            if !resolution.is_finite() || resolution < 0.0 {
                return Err(WmsError::InvalidTileConfig(format!(
                    "resolution must be a non-negative number, got {resolution}"
                )));
            }
        }
        Ok(())
    }

    fn grid_resolution(&self) -> Option<f64> {
        self.resolution.filter(|r| *r > 0.0)
    }

    fn request(&self, bbox: BoundingBox) -> TileRequest {
        TileRequest::new(bbox, self.tile_width, self.tile_height)
    }
}

/// Resolve the ordered tile list for a layer.
///
/// 1. Configured bboxes, in configured order.
/// 2. With a resolution and a layer bbox: a grid over the extent, x-major.
/// 3. With a layer bbox: one tile covering it.
/// 4. Otherwise: one tile covering the home region.
pub fn resolve_tiles(layer: &LayerInfo, config: &TileConfig) -> Vec<TileRequest> {
    if let Some(bboxes) = config.bboxes.as_ref().filter(|b| !b.is_empty()) {
        return bboxes
            .iter()
            .map(|bbox| config.request(bbox.clone()))
            .collect();
    }

    let Some(layer_bbox) = &layer.bbox else {
        return vec![config.request(home_bbox())];
    };

    let extent = select_extent(layer_bbox, config);
    match config.grid_resolution() {
        Some(resolution) => grid_tiles(&extent, config, resolution),
        None => vec![config.request(extent)],
    }
}

fn select_extent(layer_bbox: &BoundingBox, config: &TileConfig) -> BoundingBox {
    let home = home_bbox();
    if config.prefer_home_extent && layer_bbox.has_crs(&home.crs) && layer_bbox.contains(&home) {
        return home;
    }
    layer_bbox.clone()
}

/// Cut `bbox` into fixed-size cells anchored at its min corner.
///
/// Cells on the far edges may overhang the bbox; they are not clipped.
fn grid_tiles(bbox: &BoundingBox, config: &TileConfig, resolution: f64) -> Vec<TileRequest> {
    let cell_width = f64::from(config.tile_width) * resolution;
    let cell_height = f64::from(config.tile_height) * resolution;
    let columns = cell_count(bbox.width(), cell_width);
    let rows = cell_count(bbox.height(), cell_height);

    let mut tiles = Vec::with_capacity(columns * rows);
    for x in 0..columns {
        let min_x = bbox.min_x + x as f64 * cell_width;
        for y in 0..rows {
            let min_y = bbox.min_y + y as f64 * cell_height;
            let cell = BoundingBox::new(
                bbox.crs.clone(),
                min_x,
                min_y,
                min_x + cell_width,
                min_y + cell_height,
            );
            tiles.push(config.request(cell));
        }
    }
    tiles
}

fn cell_count(extent: f64, cell: f64) -> usize {
    ((extent / cell).ceil() as i64).max(1) as usize
}
