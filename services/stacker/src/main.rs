//! Daily stacker.
//!
//! Folds the raw frames under the input directory into one composite per
//! layer, day and tile, merges the result into the existing manifest and
//! regenerates the viewer page.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use day_stacker::{build_day_stacks, write_viewer, StackConfig, DEFAULT_TITLE};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "radar-stacker")]
#[command(about = "Stack downloaded radar frames into daily composites")]
struct Args {
    /// Root of the raw tile tree
    #[arg(long, env = "RADAR_DATA_DIR", default_value = "data")]
    input_dir: PathBuf,

    /// Where composites, manifest.json and index.html are written
    #[arg(long, env = "RADAR_DAILY_DIR", default_value = "daily")]
    output_dir: PathBuf,

    /// Manifest path (default: <output-dir>/manifest.json)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Only stack these layers (comma separated)
    #[arg(long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Viewer page title
    #[arg(long, default_value = DEFAULT_TITLE)]
    title: String,

    /// Do not write index.html
    #[arg(long)]
    no_viewer: bool,

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

fn run(args: Args) -> Result<()> {
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| args.output_dir.join("manifest.json"));

    let mut config = StackConfig::new(&args.input_dir, &args.output_dir)
        .with_existing_manifest(&manifest_path);
    let layers: BTreeSet<String> = args
        .layers
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if !layers.is_empty() {
        config = config.with_layers(layers);
    }

    let manifest = build_day_stacks(&config).with_context(|| {
        format!("Failed to stack tiles from {}", args.input_dir.display())
    })?;
    manifest
        .write(&manifest_path)
        .with_context(|| format!("Failed to write manifest {}", manifest_path.display()))?;
    info!(
        path = %manifest_path.display(),
        layers = manifest.layers.len(),
        "Wrote manifest"
    );

    if !args.no_viewer {
        write_viewer(&args.output_dir, &manifest, &args.title, "")
            .context("Failed to write viewer")?;
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_level, args.verbose, args.log_json) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Stacking failed");
            ExitCode::FAILURE
        }
    }
}
