//! Daily radar composites.
//!
//! Pipeline:
//! 1. [`discovery`] scans `<layer>/<YYYYMMDDTHHMMSSZ>/tile_<index>_*.png`.
//! 2. [`stack`] folds each day's frames per tile index into one image using
//!    the chroma mask in [`composite`], merging with a previous [`manifest`]
//!    so re-runs only add new frames.
//! 3. [`viewer`] renders a static HTML page from the manifest.

pub mod composite;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod stack;
pub mod viewer;

pub use composite::{stack_images, Compositor, CHROMA_THRESHOLD};
pub use discovery::{discover_tiles, Discovery, Frame};
pub use error::{StackError, StackResult};
pub use manifest::{DayEntry, LayerEntry, Manifest, TileEntry};
pub use stack::{build_day_stacks, composite_path, StackConfig};
pub use viewer::{render_viewer_html, write_viewer, DEFAULT_TITLE, VIEWER_FILE};
