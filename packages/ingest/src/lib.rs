#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for turning yearly incident files into the master incident
//! table, and for deriving filtered extracts from it.
//!
//! The master table is a single CSV file. Filtered extracts are CSV files
//! named after their [`ExtractKey`] plus a fingerprint of the master table,
//! so a rebuilt master table never serves a stale extract.

pub mod area;
pub mod extract;
pub mod fingerprint;
pub mod master;
pub mod preprocess;
pub mod yearly;

use std::path::Path;

use crime_atlas_incident_models::InvalidYearRangeError;

pub use area::{AreaQuery, query_area};
pub use extract::{Extract, ExtractCache, ExtractSample};
pub use fingerprint::MasterFingerprint;
pub use master::{MasterTable, read_master, read_records, write_master};
pub use preprocess::{YearWindow, preprocess};
pub use yearly::{RawRecord, load_yearly_files};

/// Errors that can occur while building or filtering incident tables.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The raw data directory does not exist.
    #[error("Data directory not found: {0}")]
    DirectoryNotFound(String),

    /// The master table has not been built yet.
    #[error("Master CSV file not found: {0}")]
    MasterNotFound(String),

    /// Start year after end year.
    #[error(transparent)]
    InvalidYearRange(#[from] InvalidYearRangeError),

    /// A column every record needs is absent from the input.
    #[error("Missing required column: {column}")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The filter matched nothing in the master table.
    #[error("No data matches the filter {start_year}-{end_year}, offenses: {offenses}")]
    NoMatchingData {
        /// First year of the filter.
        start_year: i32,
        /// Last year of the filter.
        end_year: i32,
        /// Offense filter, for display.
        offenses: String,
    },
}

impl IngestError {
    /// Returns `true` for errors caused by absent data rather than a
    /// failure while processing it.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::MasterNotFound(_) | Self::NoMatchingData { .. })
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Loads the yearly files in `raw_dir`, preprocesses them and writes the
/// master table to `output`. Returns the number of records written.
///
/// # Errors
///
/// Returns [`IngestError`] if the raw directory is missing, the records
/// lack the required columns, or the master table cannot be written.
pub fn build_master(
    raw_dir: &Path,
    output: &Path,
    load_start_year: i32,
    load_end_year: i32,
    window: YearWindow,
) -> Result<usize, IngestError> {
    let raw = load_yearly_files(raw_dir, load_start_year, load_end_year)?;
    if raw.is_empty() {
        log::warn!("No raw records loaded; master table not written");
        return Ok(0);
    }

    let records = preprocess(&raw, window)?;
    if records.is_empty() {
        log::warn!("Preprocessing left no records; master table not written");
        return Ok(0);
    }

    write_master(output, &records)?;
    log::info!(
        "Wrote {} records to master table {}",
        records.len(),
        output.display()
    );

    Ok(records.len())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use crime_atlas_incident_models::{IncidentRecord, parse_timestamp};

    /// Returns a fresh, empty directory under the system temp dir.
    pub fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crime_atlas_ingest_{name}_{}",
            uuid::Uuid::new_v4().simple()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn record(ts: &str, offense: &str, lon: f64, lat: f64) -> IncidentRecord {
        IncidentRecord {
            occurred_at: parse_timestamp(ts).unwrap(),
            offense: offense.to_string(),
            latitude: Some(lat),
            longitude: Some(lon),
            ccn: None,
            shift: Some("DAY".to_string()),
            method: Some("OTHERS".to_string()),
            block: None,
            ward: Some("2".to_string()),
        }
    }
}
