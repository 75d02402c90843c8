//! Loading of the yearly `Crime_Incidents_in_{year}.json` files.

use std::path::Path;

use crime_atlas_incident_models::{InvalidYearRangeError, LATITUDE_COLUMN, LONGITUDE_COLUMN};
use geojson::FeatureCollection;
use serde_json::Value;

use crate::IngestError;

/// A feature's properties plus `longitude`/`latitude` from its geometry.
pub type RawRecord = serde_json::Map<String, Value>;

/// Returns the file name of the incident file for `year`.
#[must_use]
pub fn yearly_file_name(year: i32) -> String {
    format!("Crime_Incidents_in_{year}.json")
}

/// Loads every yearly file between `start_year` and `end_year` (inclusive)
/// found in `dir`.
///
/// Missing years and files that fail to parse are logged and skipped.
///
/// # Errors
///
/// Returns [`IngestError::DirectoryNotFound`] if `dir` is not a directory,
/// or [`IngestError::InvalidYearRange`] if `start_year > end_year`.
pub fn load_yearly_files(
    dir: &Path,
    start_year: i32,
    end_year: i32,
) -> Result<Vec<RawRecord>, IngestError> {
    log::info!(
        "Loading yearly files from {} for {start_year}-{end_year}",
        dir.display()
    );

    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound(dir.display().to_string()));
    }
    if start_year > end_year {
        return Err(InvalidYearRangeError {
            start_year,
            end_year,
        }
        .into());
    }

    let mut records = Vec::new();

    for year in start_year..=end_year {
        let path = dir.join(yearly_file_name(year));
        if !path.exists() {
            log::warn!("No data file for {year} at {}, skipping", path.display());
            continue;
        }

        match load_yearly_file(&path) {
            Ok(batch) if batch.is_empty() => {
                log::warn!("No features in {} ({year})", path.display());
            }
            Ok(mut batch) => {
                log::info!("Loaded {} records for {year}", batch.len());
                records.append(&mut batch);
            }
            Err(e) => {
                log::error!("Failed to load {} ({year}): {e}", path.display());
            }
        }
    }

    if records.is_empty() {
        log::warn!(
            "No records loaded from {} for {start_year}-{end_year}",
            dir.display()
        );
    } else {
        log::info!("Loaded {} records in total", records.len());
    }

    Ok(records)
}

/// Loads a single yearly file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a `GeoJSON`
/// feature collection.
pub fn load_yearly_file(path: &Path) -> Result<Vec<RawRecord>, IngestError> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_collection(&text)
}

/// Flattens a `GeoJSON` feature collection into raw records.
///
/// # Errors
///
/// Returns [`IngestError::GeoJson`] if `text` is not a feature collection.
pub fn parse_feature_collection(text: &str) -> Result<Vec<RawRecord>, IngestError> {
    let collection: FeatureCollection = text.parse()?;

    Ok(collection
        .features
        .into_iter()
        .map(|feature| {
            let mut record = feature.properties.unwrap_or_default();
            match feature.geometry.map(|g| g.value) {
                Some(geojson::Value::Point(coords)) if coords.len() == 2 => {
                    record.insert(LONGITUDE_COLUMN.to_string(), Value::from(coords[0]));
                    record.insert(LATITUDE_COLUMN.to_string(), Value::from(coords[1]));
                }
                _ => log::trace!("Feature without a usable point geometry"),
            }
            record
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-77.03, 38.91]},
                "properties": {"START_DATE": "2021/01/02 03:04:05+00", "OFFENSE": "THEFT F/AUTO"}
            },
            {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
                "properties": {"START_DATE": "2021/01/03 03:04:05+00", "OFFENSE": "ARSON"}
            }
        ]
    }"#;

    #[test]
    fn extracts_point_coordinates() {
        let records = parse_feature_collection(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["longitude"], Value::from(-77.03));
        assert_eq!(records[0]["latitude"], Value::from(38.91));
        assert!(!records[1].contains_key("longitude"));
        assert_eq!(records[1]["OFFENSE"], Value::from("ARSON"));
    }

    #[test]
    fn skips_missing_and_broken_years() {
        let dir = temp_dir("yearly");
        std::fs::write(dir.join(yearly_file_name(2021)), SAMPLE).unwrap();
        std::fs::write(dir.join(yearly_file_name(2022)), "not json").unwrap();

        let records = load_yearly_files(&dir, 2020, 2023).unwrap();
        assert_eq!(records.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_missing_directory_and_bad_range() {
        let missing = std::env::temp_dir().join("crime_atlas_no_such_dir");
        assert!(matches!(
            load_yearly_files(&missing, 2020, 2021),
            Err(IngestError::DirectoryNotFound(_))
        ));

        let dir = temp_dir("yearly_range");
        assert!(matches!(
            load_yearly_files(&dir, 2022, 2021),
            Err(IngestError::InvalidYearRange(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
