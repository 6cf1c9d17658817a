//! Run options for the downloader, resolved from the command line.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_CAPABILITIES_URL: &str =
    "https://www.dmi.dk/ZoombareKort/map?REQUEST=GetCapabilities";
pub const DEFAULT_BASE_URL: &str = "https://www.dmi.dk/ZoombareKort/map";

/// What to download and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Root of the raw tile tree (`<output>/<layer>/<instant>/tile_*.png`)
    pub output_dir: PathBuf,
    /// Ignore instants older than this, relative to the run start
    pub max_age: Option<Duration>,
    /// Log requests instead of sending them; the watermark does not move
    pub dry_run: bool,
    /// Layer allow-list; `None` means every layer
    pub layers: Option<BTreeSet<String>>,
}

impl DownloadOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_age: None,
            dry_run: false,
            layers: None,
        }
    }

    pub fn includes(&self, layer: &str) -> bool {
        match &self.layers {
            Some(allowed) if !allowed.is_empty() => allowed.contains(layer),
            _ => true,
        }
    }

    /// Oldest instant still worth fetching.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age.and_then(|age| now.checked_sub_signed(age))
    }
}

/// Convert `--max-age-hours` to a duration. Fractional hours are allowed.
pub fn max_age_from_hours(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours < 0.0 {
        bail!("max age must be a non-negative number of hours, got {hours}");
    }
    let millis = (hours * 3_600_000.0).round();
    if millis > i64::MAX as f64 {
        bail!("max age of {} hours is out of range", hours);
    }
    match Duration::try_milliseconds(millis as i64) {
        Some(age) => Ok(age),
        None => bail!("max age of {} hours is out of range", hours),
    }
}

/// Collect a repeated/comma-separated `--layers` value into a set.
pub fn layer_set(values: &[String]) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    (!set.is_empty()).then_some(set)
}
