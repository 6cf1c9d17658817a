//! Chroma-mask compositing of radar frames.
//!
//! Radar overlays are saturated colours drawn over a neutral (grey or
//! transparent) basemap. Chroma, `max(R,G,B) - min(R,G,B)`, is near zero
//! for the basemap and large for precipitation, so comparing a frame's
//! chroma to a reference isolates the overlay.
//!
//! The reference chroma is taken once from the first image and never
//! updated. Each later frame claims a pixel when its chroma exceeds the
//! reference chroma at that pixel by more than [`CHROMA_THRESHOLD`]; the
//! claimed pixel is copied from the frame with all four channels.

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::error::{StackError, StackResult};

/// Minimum chroma gain (0-255 scale) for a frame to claim a pixel.
pub const CHROMA_THRESHOLD: u8 = 18;

#[inline]
fn pixel_chroma(pixel: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    r.max(g).max(b) - r.min(g).min(b)
}

/// Per-pixel chroma of an image, row-major. Alpha is ignored.
pub fn chroma(image: &RgbaImage) -> Vec<u8> {
    image.pixels().map(pixel_chroma).collect()
}

/// Accumulates frames onto a base image.
#[derive(Debug, Clone)]
pub struct Compositor {
    output: RgbaImage,
    base_chroma: Vec<u8>,
    frames: usize,
}

impl Compositor {
    /// Start from `base`, which is both the initial output and the chroma reference.
    pub fn new(base: RgbaImage) -> Self {
        let base_chroma = chroma(&base);
        Self {
            output: base,
            base_chroma,
            frames: 1,
        }
    }

    /// Number of images folded so far, including the base.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Fold one frame on top of the output. `source` is only used for errors.
    pub fn fold(&mut self, frame: &RgbaImage, source: &Path) -> StackResult<()> {
        let (expected_width, expected_height) = self.output.dimensions();
        let (width, height) = frame.dimensions();
        if (width, height) != (expected_width, expected_height) {
            return Err(StackError::SizeMismatch {
                path: source.to_path_buf(),
                expected_width,
                expected_height,
                width,
                height,
            });
        }

        for ((out, new), base_chroma) in self
            .output
            .pixels_mut()
            .zip(frame.pixels())
            .zip(&self.base_chroma)
        {
            if pixel_chroma(new).saturating_sub(*base_chroma) > CHROMA_THRESHOLD {
                *out = *new;
            }
        }

        self.frames += 1;
        Ok(())
    }

    pub fn finish(self) -> RgbaImage {
        self.output
    }
}

/// Decode an image file to RGBA8.
pub fn load_rgba(path: &Path) -> StackResult<RgbaImage> {
    image::open(path)
        .map(|image| image.to_rgba8())
        .map_err(|source| StackError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Stack image files in order; the first is the base.
pub fn stack_images<P: AsRef<Path>>(paths: &[P]) -> StackResult<RgbaImage> {
    let (first, rest) = paths.split_first().ok_or(StackError::NoFrames)?;

    let mut compositor = Compositor::new(load_rgba(first.as_ref())?);
    for path in rest {
        let path = path.as_ref();
        compositor.fold(&load_rgba(path)?, path)?;
    }
    Ok(compositor.finish())
}
