//! Radar tile downloader.
//!
//! Reads the WMS capabilities document, resolves each layer's tiles and
//! downloads every instant newer than the layer's saved watermark into
//! `<output>/<layer>/<YYYYMMDDTHHMMSSZ>/`. Safe to run from cron: work that
//! was not finished is picked up by the next run.

mod config;
mod download;
mod state;
mod tracker;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{
    layer_set, max_age_from_hours, DownloadOptions, DEFAULT_BASE_URL, DEFAULT_CAPABILITIES_URL,
};
use download::{build_client, fetch_capabilities, HttpTileFetcher};
use state::State;
use wms_common::TileConfig;

#[derive(Parser, Debug)]
#[command(name = "radar-downloader")]
#[command(about = "Save radar WMS tiles for every new time step")]
struct Args {
    /// Capabilities document URL
    #[arg(
        long,
        env = "RADAR_CAPABILITIES_URL",
        default_value = DEFAULT_CAPABILITIES_URL
    )]
    capabilities_url: String,

    /// GetMap base URL
    #[arg(long, env = "RADAR_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Root directory for raw tiles
    #[arg(long, env = "RADAR_DATA_DIR", default_value = "data")]
    output_dir: PathBuf,

    /// State file (default: <output-dir>/state.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Tile configuration file (JSON or YAML)
    #[arg(long)]
    tile_config: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: f64,

    /// Skip instants older than this many hours
    #[arg(long, default_value = "12")]
    max_age_hours: f64,

    /// Consider every advertised instant regardless of age
    #[arg(long, conflicts_with = "max_age_hours")]
    all_times: bool,

    /// Only process these layers (comma separated)
    #[arg(long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Log the requests that would be made without downloading
    #[arg(long)]
    dry_run: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn options(&self) -> Result<DownloadOptions> {
        let max_age = if self.all_times {
            None
        } else {
            Some(max_age_from_hours(self.max_age_hours)?)
        };
        Ok(DownloadOptions {
            output_dir: self.output_dir.clone(),
            max_age,
            dry_run: self.dry_run,
            layers: layer_set(&self.layers),
        })
    }

    fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("state.json"))
    }

    fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("Invalid timeout {}", self.timeout))
    }
}

fn log_level(level: &str, verbose: bool) -> Level {
    match level.to_lowercase().as_str() {
        _ if verbose => Level::DEBUG,
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_tracing(level: &str, verbose: bool, json: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level(level, verbose))
        .with_target(true);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run(args: Args) -> Result<bool> {
    let options = args.options()?;
    let state_path = args.state_path();
    let tile_config = TileConfig::load(args.tile_config.as_deref())
        .context("Failed to load tile configuration")?;
    let mut state = State::load(&state_path)?;
    info!(path = %state_path.display(), layers = state.len(), "Loaded state");

    let client = build_client(args.timeout()?)?;
    let url = &args.capabilities_url;
    let capabilities = fetch_capabilities(&client, url)
        .await
        .with_context(|| format!("Failed to fetch capabilities from {url}"))?;
    let layers = wms_protocol::parse_capabilities(&capabilities)
        .context("Failed to parse capabilities")?;
    info!(layers = layers.len(), "Parsed capabilities");

    let fetcher = HttpTileFetcher::new(client, args.base_url.clone());
    let summary = tracker::run_layers(
        &fetcher,
        &layers,
        &tile_config,
        &mut state,
        &state_path,
        &options,
    )
    .await?;

    info!(
        processed = summary.processed.len(),
        failed = summary.failed.len(),
        dry_run = options.dry_run,
        "Download run finished"
    );
    Ok(summary.is_success())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_level, args.verbose, args.log_json) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Download run failed");
            ExitCode::FAILURE
        }
    }
}
