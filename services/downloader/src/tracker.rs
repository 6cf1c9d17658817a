//! Decides which instants and tiles to fetch and moves the watermarks.
//!
//! Instants are handled oldest first. A layer's watermark only advances
//! past an instant once every resolved tile for it is on disk, and the
//! first failed fetch stops the layer for this run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use wms_common::time::{format_instant, instant_dir_name};
use wms_common::{resolve_tiles, LayerInfo, TileConfig, TileRequest};

use crate::config::DownloadOptions;
use crate::download::TileFetcher;
use crate::state::State;

/// What happened to one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerReport {
    /// Instants whose tiles are now all on disk
    pub completed: usize,
    /// Tiles downloaded
    pub fetched: usize,
    /// Tiles that would have been downloaded (dry-run)
    pub planned: usize,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `<output>/<layer>/<YYYYMMDDTHHMMSSZ>/`
pub fn instant_dir(output_dir: &Path, layer: &str, time: DateTime<Utc>) -> PathBuf {
    output_dir.join(layer).join(instant_dir_name(&time))
}

/// Instants of `layer` that are newer than both the age cutoff and the watermark.
pub fn pending_times(
    layer: &LayerInfo,
    watermark: Option<DateTime<Utc>>,
    cutoff: Option<DateTime<Utc>>,
) -> Vec<DateTime<Utc>> {
    layer
        .times
        .iter()
        .copied()
        .filter(|time| cutoff.map_or(true, |c| *time >= c))
        .filter(|time| watermark.map_or(true, |w| *time > w))
        .collect()
}

/// Download everything missing for one layer, updating `state` as instants complete.
#[instrument(skip_all, fields(layer = %layer.name))]
pub async fn process_layer(
    fetcher: &dyn TileFetcher,
    layer: &LayerInfo,
    tiles: &[TileRequest],
    state: &mut State,
    options: &DownloadOptions,
    now: DateTime<Utc>,
) -> Result<LayerReport> {
    let mut report = LayerReport::default();
    let watermark = state.latest_for(&layer.name);
    let pending = pending_times(layer, watermark, options.cutoff(now));
    debug!(
        available = layer.times.len(),
        pending = pending.len(),
        tiles = tiles.len(),
        "Resolved pending instants"
    );

    for time in pending {
        let dir = instant_dir(&options.output_dir, &layer.name, time);
        let missing: Vec<(usize, &TileRequest, PathBuf)> = tiles
            .iter()
            .enumerate()
            .map(|(index, tile)| (index, tile, dir.join(tile.file_name(index))))
            .filter(|(_, _, path)| !path.exists())
            .collect();

        if missing.is_empty() {
            state.update(&layer.name, time);
            report.completed += 1;
            continue;
        }

        if options.dry_run {
            for (index, tile, _) in &missing {
                info!(
                    time = %format_instant(&time),
                    index,
                    request = %fetcher.describe(&layer.name, time, tile),
                    "Would fetch"
                );
            }
            report.planned += missing.len();
            continue;
        }

        for (index, tile, path) in &missing {
            fetcher
                .fetch_tile(&layer.name, time, tile, path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to fetch tile {} of {} at {}",
                        index,
                        layer.name,
                        format_instant(&time)
                    )
                })?;
            report.fetched += 1;
        }

        state.update(&layer.name, time);
        report.completed += 1;
        debug!(time = %format_instant(&time), tiles = missing.len(), "Instant complete");
    }

    Ok(report)
}

/// Process every selected layer in order.
///
/// A failing layer is logged and recorded in the summary; the remaining
/// layers still run. Outside dry-run the state file is written after each
/// layer, and a failure to write it ends the run.
pub async fn run_layers(
    fetcher: &dyn TileFetcher,
    layers: &[LayerInfo],
    tile_config: &TileConfig,
    state: &mut State,
    state_path: &Path,
    options: &DownloadOptions,
) -> Result<RunSummary> {
    let now = Utc::now();
    let mut summary = RunSummary::default();

    for layer in layers {
        if !options.includes(&layer.name) {
            debug!(layer = %layer.name, "Layer not selected");
            continue;
        }
        if !layer.has_times() {
            debug!(layer = %layer.name, "Layer has no time dimension");
            continue;
        }

        let tiles = resolve_tiles(layer, tile_config);
        match process_layer(fetcher, layer, &tiles, state, options, now).await {
            Ok(report) => {
                info!(
                    layer = %layer.name,
                    completed = report.completed,
                    fetched = report.fetched,
                    planned = report.planned,
                    "Layer processed"
                );
                summary.processed.push(layer.name.clone());
            }
            Err(e) => {
                error!(layer = %layer.name, error = %format!("{:#}", e), "Layer failed");
                summary.failed.push(layer.name.clone());
            }
        }

        if !options.dry_run {
            state.save(state_path)?;
        }
    }

    if let Some(allowed) = &options.layers {
        for name in allowed {
            if !layers.iter().any(|layer| &layer.name == name) {
                warn!(layer = %name, "Requested layer not advertised by the server");
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use test_utils::{layers, utc};
    use wms_common::tile::parse_tile_index;
    use wms_common::BoundingBox;

    /// Records every request and writes a small file unless the instant,
    /// layer or tile index is marked as failing.
    #[derive(Default)]
    struct FakeFetcher {
        calls: Mutex<Vec<(String, DateTime<Utc>, PathBuf)>>,
        fail_at: Vec<DateTime<Utc>>,
        fail_layers: Vec<String>,
        fail_tiles: Vec<usize>,
    }

    impl FakeFetcher {
        fn failing_at(time: DateTime<Utc>) -> Self {
            Self {
                fail_at: vec![time],
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, DateTime<Utc>, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TileFetcher for FakeFetcher {
        async fn fetch_tile(
            &self,
            layer: &str,
            time: DateTime<Utc>,
            _tile: &TileRequest,
            dest: &Path,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((layer.to_string(), time, dest.to_path_buf()));
            let index = dest
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_tile_index);
            if self.fail_at.contains(&time)
                || self.fail_layers.iter().any(|l| l == layer)
                || index.is_some_and(|i| self.fail_tiles.contains(&i))
            {
                bail!("HTTP error 503 Service Unavailable");
            }
            std::fs::create_dir_all(dest.parent().unwrap())?;
            std::fs::write(dest, b"png")?;
            Ok(())
        }
    }

    fn two_tiles() -> Vec<TileRequest> {
        vec![
            TileRequest::new(BoundingBox::new("EPSG:3575", 0.0, 0.0, 1.0, 1.0), 512, 512),
            TileRequest::new(BoundingBox::new("EPSG:3575", 1.0, 0.0, 2.0, 1.0), 512, 512),
        ]
    }

    fn layer(name: &str, times: Vec<DateTime<Utc>>) -> LayerInfo {
        let bbox = BoundingBox::new("EPSG:3575", 0.0, 0.0, 2.0, 1.0);
        LayerInfo::new(name, None, times, Some(bbox))
    }

    fn options(dir: &TempDir) -> DownloadOptions {
        DownloadOptions::new(dir.path().join("data"))
    }

    #[tokio::test]
    async fn test_fetches_all_tiles_and_advances() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default();
        let mut state = State::default();
        let t1 = utc(2025, 1, 1, 6, 0);
        let t2 = utc(2025, 1, 1, 6, 5);

        let report = process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t2, t1]),
            &two_tiles(),
            &mut state,
            &options(&dir),
            t2,
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            LayerReport {
                completed: 2,
                fetched: 4,
                planned: 0
            }
        );
        assert_eq!(state.latest_for(layers::PRECTYPE), Some(t2));
        let times: Vec<_> = fetcher.calls().iter().map(|c| c.1).collect();
        assert_eq!(times, vec![t1, t1, t2, t2]);
        assert!(dir
            .path()
            .join("data/prectype/20250101T060000Z/tile_1_1_0_2_1.png")
            .is_file());
    }

    #[tokio::test]
    async fn test_resumes_partially_downloaded_instant() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let t1 = utc(2025, 1, 1, 6, 0);
        let tiles = two_tiles();
        let existing =
            instant_dir(&opts.output_dir, layers::PRECTYPE, t1).join(tiles[0].file_name(0));
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"png").unwrap();

        let fetcher = FakeFetcher::default();
        let mut state = State::default();
        let report = process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t1]),
            &tiles,
            &mut state,
            &opts,
            t1,
        )
        .await
        .unwrap();

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].2.ends_with(tiles[1].file_name(1)));
        assert_eq!(report.fetched, 1);
        assert_eq!(state.latest_for(layers::PRECTYPE), Some(t1));
    }

    #[tokio::test]
    async fn test_failure_stops_layer_without_advancing() {
        let dir = TempDir::new().unwrap();
        let t1 = utc(2025, 1, 1, 6, 0);
        let t2 = utc(2025, 1, 1, 6, 5);
        let fetcher = FakeFetcher::failing_at(t1);
        let mut state = State::default();

        let result = process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t1, t2]),
            &two_tiles()[..1],
            &mut state,
            &options(&dir),
            t2,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(fetcher.calls()[0].1, t1);
        assert_eq!(state.latest_for(layers::PRECTYPE), None);
    }

    #[tokio::test]
    async fn test_failed_tile_keeps_completed_tiles_and_watermark() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let t1 = utc(2025, 1, 1, 6, 0);
        let tiles = two_tiles();
        let fetcher = FakeFetcher {
            fail_tiles: vec![1],
            ..FakeFetcher::default()
        };
        let before = utc(2025, 1, 1, 5, 55);
        let mut state = State::default();
        state.update(layers::PRECTYPE, before);

        let result = process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t1]),
            &tiles,
            &mut state,
            &opts,
            t1,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(state.latest_for(layers::PRECTYPE), Some(before));
        let dir_t1 = instant_dir(&opts.output_dir, layers::PRECTYPE, t1);
        assert!(dir_t1.join(tiles[0].file_name(0)).is_file());
        assert!(!dir_t1.join(tiles[1].file_name(1)).exists());
    }

    #[tokio::test]
    async fn test_complete_instants_advance_without_fetching() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let t1 = utc(2025, 1, 1, 6, 0);
        let tiles = two_tiles();
        for (index, tile) in tiles.iter().enumerate() {
            let path =
                instant_dir(&opts.output_dir, layers::PRECTYPE, t1).join(tile.file_name(index));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"png").unwrap();
        }

        let fetcher = FakeFetcher::default();
        let mut state = State::default();
        process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t1]),
            &tiles,
            &mut state,
            &opts,
            t1,
        )
        .await
        .unwrap();
        assert!(fetcher.calls().is_empty());
        assert_eq!(state.latest_for(layers::PRECTYPE), Some(t1));
    }

    #[tokio::test]
    async fn test_skips_old_and_already_saved_instants() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.max_age = Some(chrono::Duration::hours(12));
        let now = utc(2025, 1, 2, 0, 0);
        let stale = utc(2025, 1, 1, 11, 55);
        let saved = utc(2025, 1, 1, 12, 0);
        let fresh = utc(2025, 1, 1, 12, 5);

        let mut state = State::default();
        state.update(layers::PRECTYPE, saved);
        let info = layer(layers::PRECTYPE, vec![stale, saved, fresh]);
        assert_eq!(
            pending_times(&info, state.latest_for(layers::PRECTYPE), opts.cutoff(now)),
            vec![fresh]
        );

        let fetcher = FakeFetcher::default();
        process_layer(&fetcher, &info, &two_tiles()[..1], &mut state, &opts, now)
            .await
            .unwrap();
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(state.latest_for(layers::PRECTYPE), Some(fresh));
    }

    #[tokio::test]
    async fn test_dry_run_fetches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.dry_run = true;
        let t1 = utc(2025, 1, 1, 6, 0);

        let fetcher = FakeFetcher::default();
        let mut state = State::default();
        let report = process_layer(
            &fetcher,
            &layer(layers::PRECTYPE, vec![t1]),
            &two_tiles(),
            &mut state,
            &opts,
            t1,
        )
        .await
        .unwrap();

        assert_eq!(report.planned, 2);
        assert!(fetcher.calls().is_empty());
        assert_eq!(state.latest_for(layers::PRECTYPE), None);
        assert!(!opts.output_dir.exists());
    }

    #[tokio::test]
    async fn test_failed_layer_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.layers = Some(BTreeSet::from([
            layers::PRECTYPE.to_string(),
            layers::REFLECTIVITY.to_string(),
        ]));
        let state_path = dir.path().join("data").join("state.json");
        let t1 = utc(2025, 1, 1, 6, 0);
        let fetcher = FakeFetcher {
            fail_layers: vec![layers::PRECTYPE.to_string()],
            ..FakeFetcher::default()
        };
        let config = TileConfig::default();
        let all = vec![
            layer(layers::PRECTYPE, vec![t1]),
            layer(layers::REFLECTIVITY, vec![t1]),
            layer("ignored", vec![t1]),
        ];

        let mut state = State::default();
        let summary = run_layers(&fetcher, &all, &config, &mut state, &state_path, &opts)
            .await
            .unwrap();

        assert!(!summary.is_success());
        assert_eq!(summary.failed, vec![layers::PRECTYPE]);
        assert_eq!(summary.processed, vec![layers::REFLECTIVITY]);
        assert!(fetcher.calls().iter().all(|c| c.0 != "ignored"));

        let saved = State::load(&state_path).unwrap();
        assert_eq!(saved.latest_for(layers::REFLECTIVITY), Some(t1));
        assert_eq!(saved.latest_for(layers::PRECTYPE), None);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write_state() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.dry_run = true;
        let state_path = dir.path().join("state.json");
        let fetcher = FakeFetcher::default();
        let mut state = State::default();

        let summary = run_layers(
            &fetcher,
            &[layer(layers::PRECTYPE, vec![utc(2025, 1, 1, 6, 0)])],
            &TileConfig::default(),
            &mut state,
            &state_path,
            &opts,
        )
        .await
        .unwrap();

        assert!(summary.is_success());
        assert!(!state_path.exists());
    }
}
