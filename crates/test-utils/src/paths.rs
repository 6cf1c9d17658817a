//! Scratch directory helpers.

use std::path::{Path, PathBuf};

/// A temporary workspace with the two roots the pipeline uses.
///
/// Everything is removed when the value is dropped.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("radar_test_")
            .tempdir()
            .expect("Failed to create temporary test directory");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Raw tile root (`data/`).
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Stacked output root (`daily/`).
    pub fn daily_dir(&self) -> PathBuf {
        self.dir.path().join("daily")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
