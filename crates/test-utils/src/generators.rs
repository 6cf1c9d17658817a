//! Generators for synthetic radar frames.
//!
//! Frames are small RGBA images with a uniform background and a handful of
//! painted pixels, which keeps stacking assertions pixel-exact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};

use wms_common::time::instant_dir_name;

/// Creates a frame filled with `background` and the given pixels painted.
///
/// # Example
///
/// ```
/// use test_utils::{colors, create_frame};
///
/// let frame = create_frame(2, 2, colors::TRANSPARENT, &[((0, 0), colors::RED)]);
/// assert_eq!(frame.get_pixel(0, 0).0, colors::RED);
/// assert_eq!(frame.get_pixel(1, 1).0, colors::TRANSPARENT);
/// ```
pub fn create_frame(
    width: u32,
    height: u32,
    background: [u8; 4],
    painted: &[((u32, u32), [u8; 4])],
) -> RgbaImage {
    let mut frame = RgbaImage::from_pixel(width, height, Rgba(background));
    for &((x, y), color) in painted {
        frame.put_pixel(x, y, Rgba(color));
    }
    frame
}

/// Writes an image as PNG, creating parent directories.
pub fn write_png(path: &Path, image: &RgbaImage) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create frame directory");
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .expect("write frame PNG");
}

/// Reads a PNG back as RGBA.
pub fn read_png(path: &Path) -> RgbaImage {
    image::open(path).expect("read PNG").to_rgba8()
}

/// Path of a raw tile as the downloader lays it out:
/// `<root>/<layer>/<YYYYMMDDTHHMMSSZ>/tile_<index>_0_0_1_1.png`.
pub fn raw_tile_path(root: &Path, layer: &str, time: DateTime<Utc>, index: usize) -> PathBuf {
    root.join(layer)
        .join(instant_dir_name(&time))
        .join(format!("tile_{index}_0_0_1_1.png"))
}

/// Writes a 2x2 transparent raw tile with one coloured pixel and returns its path.
pub fn write_raw_tile(
    root: &Path,
    layer: &str,
    time: DateTime<Utc>,
    index: usize,
    pixel: (u32, u32),
    color: [u8; 4],
) -> PathBuf {
    let path = raw_tile_path(root, layer, time, index);
    let frame = create_frame(2, 2, crate::colors::TRANSPARENT, &[(pixel, color)]);
    write_png(&path, &frame);
    path
}
