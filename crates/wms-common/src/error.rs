//! Error types shared by the radar-history crates.

use thiserror::Error;

/// Result type alias using WmsError.
pub type WmsResult<T> = Result<T, WmsError>;

/// Errors raised while loading tile configuration.
#[derive(Debug, Error)]
pub enum WmsError {
    #[error("Invalid tile configuration: {0}")]
    InvalidTileConfig(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
