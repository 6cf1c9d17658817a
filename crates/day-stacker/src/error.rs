//! Error types for stacking and manifest handling.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type StackResult<T> = Result<T, StackError>;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(
        "Mismatched tile sizes while stacking {path}: expected {expected_width}x{expected_height}, got {width}x{height}"
    )]
    SizeMismatch {
        path: PathBuf,
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("No images provided for stacking")]
    NoFrames,

    #[error("Invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StackError {
    /// Adapter for `map_err` on filesystem calls.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StackError + '_ {
        move |source| StackError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
