//! Shared test utilities for the radar-history workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Scratch workspaces with `data/` (raw tiles) and `daily/` (composites) roots
//! - Synthetic RGBA radar frames written as PNG
//! - Common instants and colours
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../../crates/test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert that a pixel of an RGBA image has the expected value.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_pixel;
///
/// assert_pixel!(image, (0, 0), [255, 0, 0, 255]);
/// ```
#[macro_export]
macro_rules! assert_pixel {
    ($image:expr, ($x:expr, $y:expr), $expected:expr) => {{
        let actual = $image.get_pixel($x, $y).0;
        let expected: [u8; 4] = $expected;
        if actual != expected {
            panic!(
                "pixel ({}, {}) mismatch\n  actual: `{:?}`,\nexpected: `{:?}`",
                $x, $y, actual, expected
            );
        }
    }};
}
