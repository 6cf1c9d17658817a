//! Common test fixtures for radar-history tests.

use chrono::{DateTime, TimeZone, Utc};

/// Colours used by synthetic frames.
pub mod colors {
    /// Fully transparent (no data)
    pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

    /// Neutral grey basemap pixel (zero chroma)
    pub const BASEMAP_GREY: [u8; 4] = [128, 128, 128, 255];

    /// Heavy rain
    pub const RED: [u8; 4] = [255, 0, 0, 255];

    /// Light rain
    pub const BLUE: [u8; 4] = [0, 0, 255, 255];

    /// Moderate rain
    pub const GREEN: [u8; 4] = [0, 200, 0, 255];

    /// Faint tint: chroma 10, below the stacking threshold
    pub const FAINT: [u8; 4] = [138, 128, 128, 255];
}

/// Common layer names.
pub mod layers {
    pub const PRECTYPE: &str = "prectype";
    pub const REFLECTIVITY: &str = "reflectivity";
}

/// Build a UTC instant; panics on invalid input (tests only).
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}
