#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record types shared across the crime atlas workspace.
//!
//! Defines the row layout of the master incident table, the canonical
//! offense filter used to key filtered extracts, and the timestamp parser
//! that every reader of the master table goes through.

pub mod offense;
pub mod timestamp;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use offense::{ExtractKey, InvalidYearRangeError, OffenseFilter};
pub use timestamp::parse_timestamp;

/// Name of the time column in the master table.
pub const TIME_COLUMN: &str = "occurred_at";

/// Name of the offense column in the master table.
pub const OFFENSE_COLUMN: &str = "OFFENSE";

/// Name of the latitude column in the master table.
pub const LATITUDE_COLUMN: &str = "latitude";

/// Name of the longitude column in the master table.
pub const LONGITUDE_COLUMN: &str = "longitude";

/// Source property holding the incident start time in the yearly files.
pub const SOURCE_DATE_FIELD: &str = "START_DATE";

/// Descriptive source properties carried into the master table.
pub const DESCRIPTIVE_FIELDS: [&str; 5] = ["CCN", "SHIFT", "METHOD", "BLOCK", "WARD"];

/// Output format for timestamps written to CSV files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single crime incident as stored in the master table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// When the incident started.
    #[serde(with = "timestamp::csv_format")]
    pub occurred_at: NaiveDateTime,
    /// Offense category as reported by the source (e.g. `"THEFT/OTHER"`).
    #[serde(rename = "OFFENSE")]
    pub offense: String,
    /// Latitude (WGS 84).
    pub latitude: Option<f64>,
    /// Longitude (WGS 84).
    pub longitude: Option<f64>,
    /// Case number.
    #[serde(rename = "CCN")]
    pub ccn: Option<String>,
    /// Police shift (`DAY`, `EVENING`, `MIDNIGHT`).
    #[serde(rename = "SHIFT")]
    pub shift: Option<String>,
    /// Method (`GUN`, `KNIFE`, `OTHERS`).
    #[serde(rename = "METHOD")]
    pub method: Option<String>,
    /// Block-level address.
    #[serde(rename = "BLOCK")]
    pub block: Option<String>,
    /// Ward identifier.
    #[serde(rename = "WARD")]
    pub ward: Option<String>,
}

impl IncidentRecord {
    /// Returns the `(longitude, latitude)` pair when both are present and
    /// finite.
    #[must_use]
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Some((lon, lat)),
            _ => None,
        }
    }
}

/// A geographic bounding box in WGS 84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[must_use]
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Creates a bounding box from a `[minLng, minLat, maxLng, maxLat]`
    /// slice. Returns `None` unless exactly four finite values are given.
    #[must_use]
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d] if values.iter().all(|v| v.is_finite()) => {
                Some(Self::new(*a, *b, *c, *d))
            }
            _ => None,
        }
    }

    /// Parses `"minLng,minLat,maxLng,maxLat"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        Self::from_slice(&parts)
    }

    /// Returns `true` if the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Returns the box as `[minLng, minLat, maxLng, maxLat]`.
    #[must_use]
    pub const fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounds_string() {
        let bbox = BoundingBox::parse("-77.1, 38.8, -76.9, 39.0").unwrap();
        assert!((bbox.min_lon - -77.1).abs() < f64::EPSILON);
        assert!((bbox.max_lat - 39.0).abs() < f64::EPSILON);
        assert!(bbox.contains(-77.0, 38.9));
        assert!(bbox.contains(-77.1, 38.8));
        assert!(!bbox.contains(-76.8, 38.9));
    }

    #[test]
    fn rejects_malformed_bounds() {
        assert!(BoundingBox::parse("-77.1,38.8,-76.9").is_none());
        assert!(BoundingBox::parse("a,b,c,d").is_none());
        assert!(BoundingBox::from_slice(&[0.0, f64::NAN, 1.0, 1.0]).is_none());
    }

    #[test]
    fn lon_lat_requires_both_coordinates() {
        let mut record = IncidentRecord {
            occurred_at: parse_timestamp("2020-01-01 00:00:00").unwrap(),
            offense: "THEFT/OTHER".to_string(),
            latitude: Some(38.9),
            longitude: None,
            ccn: None,
            shift: None,
            method: None,
            block: None,
            ward: None,
        };
        assert!(record.lon_lat().is_none());
        record.longitude = Some(-77.0);
        assert_eq!(record.lon_lat(), Some((-77.0, 38.9)));
    }
}
