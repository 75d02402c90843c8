//! Lenient timestamp parsing for incident data.
//!
//! Source files mix ISO 8601 strings, space-separated datetimes and
//! `YYYY/MM/DD HH:MM:SS+00` values. Anything that does not parse is
//! reported as `None` so callers can drop the row instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: [&str; 3] = [
    "%Y/%m/%d %H:%M:%S%#z",
    "%Y-%m-%d %H:%M:%S%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parses an incident timestamp, normalising offset-aware values to UTC.
///
/// Returns `None` for empty or unrecognised input.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive);
        }
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.naive_utc());
        }
    }

    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(s, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Serde adapter writing timestamps as `YYYY-MM-DD HH:MM:SS` and reading
/// anything [`parse_timestamp`] accepts.
pub mod csv_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

    use crate::TIMESTAMP_FORMAT;

    /// Serializes a timestamp in the master table format.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    /// Deserializes a timestamp leniently.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}
