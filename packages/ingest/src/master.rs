//! CSV reading and writing for the master table and its extracts.

use std::path::Path;

use crime_atlas_incident_models::{IncidentRecord, TIME_COLUMN, parse_timestamp};
use serde::Deserialize;

use crate::{IngestError, ensure_dir};

/// Rows read from the master table.
#[derive(Debug, Clone, Default)]
pub struct MasterTable {
    /// Rows with a parsable timestamp.
    pub records: Vec<IncidentRecord>,
    /// Number of rows dropped because their timestamp did not parse.
    pub dropped: usize,
}

/// A CSV row as written on disk. Numeric columns that fail to parse are
/// read as missing instead of failing the whole file.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    occurred_at: Option<String>,
    #[serde(rename = "OFFENSE", default)]
    offense: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    longitude: Option<f64>,
    #[serde(rename = "CCN", default)]
    ccn: Option<String>,
    #[serde(rename = "SHIFT", default)]
    shift: Option<String>,
    #[serde(rename = "METHOD", default)]
    method: Option<String>,
    #[serde(rename = "BLOCK", default)]
    block: Option<String>,
    #[serde(rename = "WARD", default)]
    ward: Option<String>,
}

impl CsvRow {
    fn into_record(self) -> Option<IncidentRecord> {
        let occurred_at = parse_timestamp(self.occurred_at.as_deref()?)?;
        Some(IncidentRecord {
            occurred_at,
            offense: self.offense.unwrap_or_default(),
            latitude: self.latitude,
            longitude: self.longitude,
            ccn: self.ccn,
            shift: self.shift,
            method: self.method,
            block: self.block,
            ward: self.ward,
        })
    }
}

/// Writes `records` to the master table at `path`, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_master(path: &Path, records: &[IncidentRecord]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Reads the master table, dropping rows with unparsable timestamps.
///
/// # Errors
///
/// Returns [`IngestError::MasterNotFound`] if `path` does not exist,
/// [`IngestError::MissingColumn`] if the time column is absent, or a CSV
/// error if the file is malformed.
pub fn read_master(path: &Path) -> Result<MasterTable, IngestError> {
    if !path.is_file() {
        return Err(IngestError::MasterNotFound(path.display().to_string()));
    }

    let table = read_table(path, None)?;
    log::info!(
        "Loaded {} records from {} ({} dropped)",
        table.records.len(),
        path.display(),
        table.dropped
    );
    Ok(table)
}

/// Reads up to `limit` rows (all rows when `None`) from an extract or
/// master file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or lacks the time column.
pub fn read_records(path: &Path, limit: Option<usize>) -> Result<Vec<IncidentRecord>, IngestError> {
    Ok(read_table(path, limit)?.records)
}

/// Counts the data rows of a CSV file without deserialising them.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn count_rows(path: &Path) -> Result<usize, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut count = 0;
    for row in reader.records() {
        row?;
        count += 1;
    }
    Ok(count)
}

fn read_table(path: &Path, limit: Option<usize>) -> Result<MasterTable, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;

    if !reader.headers()?.iter().any(|h| h == TIME_COLUMN) {
        return Err(IngestError::MissingColumn {
            column: TIME_COLUMN.to_string(),
        });
    }

    let mut table = MasterTable::default();
    for row in reader.deserialize::<CsvRow>() {
        if limit.is_some_and(|limit| table.records.len() >= limit) {
            break;
        }
        match row?.into_record() {
            Some(record) => table.records.push(record),
            None => table.dropped += 1,
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, temp_dir};

    #[test]
    fn writes_and_reads_master() {
        let dir = temp_dir("master_io");
        let path = dir.join("nested").join("master.csv");
        let records = vec![
            record("2020-01-01 08:00:00", "THEFT/OTHER", -77.0, 38.9),
            record("2020-02-01 09:30:00", "ROBBERY", -77.1, 38.8),
        ];

        write_master(&path, &records).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("occurred_at,OFFENSE,latitude,longitude,CCN,SHIFT,METHOD,BLOCK,WARD"));

        let table = read_master(&path).unwrap();
        assert_eq!(table.records, records);
        assert_eq!(table.dropped, 0);
        assert_eq!(count_rows(&path).unwrap(), 2);
        assert_eq!(read_records(&path, Some(1)).unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn drops_unparsable_rows_and_bad_numbers() {
        let dir = temp_dir("master_lenient");
        let path = dir.join("master.csv");
        std::fs::write(
            &path,
            "occurred_at,OFFENSE,latitude,longitude\n\
             2020-01-01 00:00:00,THEFT/OTHER,abc,-77.0\n\
             not a date,ROBBERY,38.9,-77.0\n\
             ,ROBBERY,38.9,-77.0\n",
        )
        .unwrap();

        let table = read_master(&path).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.dropped, 2);
        assert!(table.records[0].latitude.is_none());
        assert_eq!(table.records[0].longitude, Some(-77.0));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn reports_missing_master_and_time_column() {
        let dir = temp_dir("master_missing");
        assert!(matches!(
            read_master(&dir.join("nope.csv")),
            Err(IngestError::MasterNotFound(_))
        ));

        let path = dir.join("no_time.csv");
        std::fs::write(&path, "OFFENSE\nROBBERY\n").unwrap();
        assert!(matches!(
            read_master(&path),
            Err(IngestError::MissingColumn { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
