//! Time handling for WMS time dimensions and on-disk instant naming.
//!
//! Capabilities documents advertise available frames either as explicit
//! ISO 8601 instants or as `start/end/period` intervals. Everything is
//! normalized to `DateTime<Utc>`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

/// Wire and JSON format for instants (`2025-01-01T00:00:00Z`).
pub const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Directory name format for one downloaded instant (`20250101T000000Z`).
pub const INSTANT_DIR_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Directory name format for one stacked day (`2025-01-01`).
pub const DAY_FORMAT: &str = "%Y-%m-%d";

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid ISO 8601 period: {0}")]
    InvalidPeriod(String),

    #[error("Year and month periods are not supported: {0}")]
    UnsupportedPeriod(String),

    #[error("Invalid time interval (expected start/end/period): {0}")]
    InvalidInterval(String),
}

/// Parse an ISO 8601 instant. Values without an offset are taken as UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    // Full datetime with offset or Z
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without timezone (assume UTC)
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    // Date only
    if let Ok(date) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

pub fn format_instant(value: &DateTime<Utc>) -> String {
    value.format(INSTANT_FORMAT).to_string()
}

/// Name of the directory that holds all tiles of one instant.
pub fn instant_dir_name(value: &DateTime<Utc>) -> String {
    value.format(INSTANT_DIR_FORMAT).to_string()
}

/// Inverse of [`instant_dir_name`]. Anything that is not exactly
/// `YYYYMMDDTHHMMSSZ` yields `None`.
pub fn parse_instant_dir(name: &str) -> Option<DateTime<Utc>> {
    let bytes = name.as_bytes();
    if bytes.len() != 16 || bytes[8] != b'T' || bytes[15] != b'Z' {
        return None;
    }
    let digits_ok = bytes[..8]
        .iter()
        .chain(&bytes[9..15])
        .all(u8::is_ascii_digit);
    if !digits_ok {
        return None;
    }
    NaiveDateTime::parse_from_str(name, INSTANT_DIR_FORMAT)
        .ok()
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Parse an ISO 8601 period such as `PT5M`, `P1DT12H` or `P2W`.
///
/// Only fixed-length components are accepted; a non-zero year or month
/// component is rejected because it has no fixed duration.
pub fn parse_period(s: &str) -> Result<Duration, TimeParseError> {
    let invalid = || TimeParseError::InvalidPeriod(s.to_string());

    let body = s.trim().strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, time),
        None => (body, ""),
    };
    if date_part.is_empty() && time_part.is_empty() {
        return Err(invalid());
    }

    let mut total: i64 = 0;
    let mut add = |value: i64, unit: i64| -> Result<(), TimeParseError> {
        total = value
            .checked_mul(unit)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(invalid)?;
        Ok(())
    };

    for (value, designator) in period_components(date_part).ok_or_else(invalid)? {
        match designator {
            'Y' | 'M' if value != 0 => {
                return Err(TimeParseError::UnsupportedPeriod(s.to_string()))
            }
            'Y' | 'M' => {}
            'W' => add(value, 7 * SECONDS_PER_DAY)?,
            'D' => add(value, SECONDS_PER_DAY)?,
            _ => return Err(invalid()),
        }
    }

    for (value, designator) in period_components(time_part).ok_or_else(invalid)? {
        match designator {
            'H' => add(value, SECONDS_PER_HOUR)?,
            'M' => add(value, SECONDS_PER_MINUTE)?,
            'S' => add(value, 1)?,
            _ => return Err(invalid()),
        }
    }

    Duration::try_seconds(total).ok_or_else(invalid)
}

/// Split `1D12H` into `[(1, 'D'), (12, 'H')]`.
fn period_components(segment: &str) -> Option<Vec<(i64, char)>> {
    let mut components = Vec::new();
    let mut digits = String::new();

    for ch in segment.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let value = digits.parse().ok()?;
        components.push((value, ch.to_ascii_uppercase()));
        digits.clear();
    }

    digits.is_empty().then_some(components)
}

/// A WMS `start/end/period` time interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Duration,
}

impl TimeInterval {
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let [start, end, period] = parts.as_slice() else {
            return Err(TimeParseError::InvalidInterval(s.to_string()));
        };

        Ok(Self {
            start: parse_instant(start)?,
            end: parse_instant(end)?,
            period: parse_period(period)?,
        })
    }

    /// Expand to explicit instants: `start`, `start + period`, ... while `<= end`.
    ///
    /// A non-positive period yields no instants.
    pub fn instants(&self) -> Vec<DateTime<Utc>> {
        if self.period <= Duration::zero() {
            return Vec::new();
        }

        let mut instants = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            instants.push(current);
            match current.checked_add_signed(self.period) {
                Some(next) => current = next,
                None => break,
            }
        }
        instants
    }
}

/// Expand the text of a WMS time dimension into explicit instants.
///
/// The text is a comma-separated list whose items are either instants or
/// `start/end/period` intervals. Items that fail to parse are logged and
/// contribute nothing. The result is in document order and may contain
/// duplicates.
pub fn expand_time_values(text: &str) -> Vec<DateTime<Utc>> {
    let mut times = Vec::new();

    for item in text
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
    {
        if item.contains('/') {
            match TimeInterval::parse(item) {
                Ok(interval) => times.extend(interval.instants()),
                Err(e) => debug!(value = %item, error = %e, "Ignoring time interval"),
            }
            continue;
        }

        match parse_instant(item) {
            Ok(time) => times.push(time),
            Err(e) => warn!(value = %item, error = %e, "Ignoring unparsable time value"),
        }
    }

    times
}

/// Serde adapter for a single instant in [`INSTANT_FORMAT`].
pub mod serde_instant {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_instant(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for a list of instants in [`INSTANT_FORMAT`].
pub mod serde_instant_list {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        values: &[DateTime<Utc>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(super::format_instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<DateTime<Utc>>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|value| super::parse_instant(value).map_err(serde::de::Error::custom))
            .collect()
    }
}
