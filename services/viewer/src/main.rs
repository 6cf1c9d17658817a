//! Regenerate `index.html` from an existing manifest.

use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use day_stacker::{write_viewer, Manifest, DEFAULT_TITLE};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "radar-viewer")]
#[command(about = "Generate an HTML viewer for stacked daily tiles")]
struct Args {
    /// Directory holding the composites
    #[arg(long, env = "RADAR_DAILY_DIR", default_value = "daily")]
    stacked_dir: PathBuf,

    /// Manifest path (default: <stacked-dir>/manifest.json)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Where index.html is written (default: the stacked directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Prefix for tile image URLs (default: stacked dir relative to output dir)
    #[arg(long)]
    tile_base: Option<String>,

    /// Page title
    #[arg(long, default_value = DEFAULT_TITLE)]
    title: String,

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

/// URL prefix that reaches `stacked_dir` from a page in `output_dir`.
fn default_tile_base(stacked_dir: &Path, output_dir: &Path) -> String {
    fn parts(path: &Path) -> Vec<String> {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    }

    if stacked_dir.is_absolute() != output_dir.is_absolute() {
        return format!("{}/", stacked_dir.display());
    }

    let stacked = parts(stacked_dir);
    let output = parts(output_dir);
    let common = stacked
        .iter()
        .zip(&output)
        .take_while(|(a, b)| a == b)
        .count();

    let segments: Vec<&str> = std::iter::repeat("..")
        .take(output.len() - common)
        .chain(stacked[common..].iter().map(String::as_str))
        .collect();
    if segments.is_empty() {
        String::new()
    } else {
        format!("{}/", segments.join("/"))
    }
}

fn run(args: Args) -> Result<()> {
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| args.stacked_dir.join("manifest.json"));
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.stacked_dir.clone());
    let tile_base = args
        .tile_base
        .clone()
        .unwrap_or_else(|| default_tile_base(&args.stacked_dir, &output_dir));

    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    write_viewer(&output_dir, &manifest, &args.title, &tile_base)
        .context("Failed to write viewer")?;
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
            error!(error = %format!("{:#}", e), "Viewer generation failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tile_base() {
        let cases = [
            ("daily", "daily", ""),
            ("site/daily", "site", "daily/"),
            ("./daily", "web", "../daily/"),
            ("/srv/daily", "/srv/www/radar", "../../daily/"),
        ];
        for (stacked, output, expected) in cases {
            let base = default_tile_base(Path::new(stacked), Path::new(output));
            assert_eq!(base, expected, "{stacked} from {output}");
        }
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level("info", false), Level::INFO);
        assert_eq!(log_level("WARN", false), Level::WARN);
        assert_eq!(log_level("trace", false), Level::TRACE);
        assert_eq!(log_level("error", true), Level::DEBUG);
        assert_eq!(log_level("loud", false), Level::INFO);
    }

    #[test]
    fn test_log_json_flag() {
        let args = Args::try_parse_from(["radar-viewer", "--log-json", "--verbose"]).unwrap();
        assert!(args.log_json);
        assert!(args.verbose);
        assert!(!Args::try_parse_from(["radar-viewer"]).unwrap().log_json);
    }
}
