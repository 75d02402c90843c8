//! Filtered extract cache.
//!
//! An extract is the subset of the master table matching an
//! [`ExtractKey`], materialised as a CSV file in the extract directory.
//! Extracts are never refreshed in place; the master table fingerprint in
//! the file name takes care of staleness.
//!
//! Two requests generating the same key at the same time both write the
//! full extract. Each writes to its own temporary file and renames it into
//! place, so readers never observe a partial file and the last rename
//! wins. Both writers produce identical content.

use std::path::{Path, PathBuf};

use crime_atlas_incident_models::{ExtractKey, IncidentRecord};
use uuid::Uuid;

use crate::{IngestError, MasterFingerprint, ensure_dir, master};

/// A materialised extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    /// Full path of the extract file.
    pub path: PathBuf,
    /// File name of the extract within the extract directory.
    pub file_name: String,
    /// Number of rows in the extract.
    pub record_count: usize,
    /// `true` if this call generated the file, `false` if it was cached.
    pub generated: bool,
}

/// The first rows of an extract.
#[derive(Debug, Clone)]
pub struct ExtractSample {
    /// Up to `limit` rows from the start of the extract.
    pub records: Vec<IncidentRecord>,
    /// Total rows in the extract.
    pub total: usize,
    /// File name of the extract used.
    pub file_name: String,
}

/// Generates and looks up extracts of a master table.
#[derive(Debug, Clone)]
pub struct ExtractCache {
    master_path: PathBuf,
    extract_dir: PathBuf,
}

impl ExtractCache {
    /// Creates a cache over the master table at `master_path`, storing
    /// extracts in `extract_dir`.
    pub fn new(master_path: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            master_path: master_path.into(),
            extract_dir: extract_dir.into(),
        }
    }

    /// Path of the master table.
    #[must_use]
    pub fn master_path(&self) -> &Path {
        &self.master_path
    }

    /// Directory holding the extracts.
    #[must_use]
    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Returns `true` if the master table exists.
    #[must_use]
    pub fn master_exists(&self) -> bool {
        self.master_path.is_file()
    }

    /// Returns the file name the extract for `key` has against the current
    /// master table.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MasterNotFound`] if the master table is
    /// missing.
    pub fn file_name(&self, key: &ExtractKey) -> Result<String, IngestError> {
        let fingerprint = MasterFingerprint::of(&self.master_path)?;
        Ok(key.file_name(Some(fingerprint.as_str())))
    }

    /// Returns the path of the extract for `key` if it has already been
    /// generated.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MasterNotFound`] if the master table is
    /// missing.
    pub fn lookup(&self, key: &ExtractKey) -> Result<Option<PathBuf>, IngestError> {
        let path = self.extract_dir.join(self.file_name(key)?);
        Ok(path.is_file().then_some(path))
    }

    /// Returns the extract for `key`, generating it from the master table
    /// if it does not exist yet.
    ///
    /// Rows are filtered by year range first, then by case-insensitive
    /// offense membership.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MasterNotFound`] if the master table is
    /// missing, [`IngestError::NoMatchingData`] if nothing matches, or an
    /// I/O or CSV error if reading or writing fails.
    pub fn prepare(&self, key: &ExtractKey) -> Result<Extract, IngestError> {
        let file_name = self.file_name(key)?;
        let path = self.extract_dir.join(&file_name);

        if path.is_file() {
            let record_count = master::count_rows(&path)?;
            log::debug!("Using cached extract {file_name} ({record_count} records)");
            return Ok(Extract {
                path,
                file_name,
                record_count,
                generated: false,
            });
        }

        let table = master::read_master(&self.master_path)?;
        let filtered = filter_records(table.records, key);
        log::info!(
            "Filter {}-{} offenses [{}] matched {} records",
            key.start_year,
            key.end_year,
            key.offenses,
            filtered.len()
        );

        if filtered.is_empty() {
            return Err(IngestError::NoMatchingData {
                start_year: key.start_year,
                end_year: key.end_year,
                offenses: key.offenses.to_string(),
            });
        }

        ensure_dir(&self.extract_dir)?;
        write_atomic(&path, &filtered)?;
        log::info!("Wrote extract {file_name} ({} records)", filtered.len());

        Ok(Extract {
            path,
            file_name,
            record_count: filtered.len(),
            generated: true,
        })
    }

    /// Returns the first `limit` rows of the extract for `key`, generating
    /// the extract if needed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::prepare`].
    pub fn sample(&self, key: &ExtractKey, limit: usize) -> Result<ExtractSample, IngestError> {
        let extract = self.prepare(key)?;
        let records = master::read_records(&extract.path, Some(limit))?;
        Ok(ExtractSample {
            records,
            total: extract.record_count,
            file_name: extract.file_name,
        })
    }
}

/// Reads every row of an extract file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_extract(path: &Path) -> Result<Vec<IncidentRecord>, IngestError> {
    master::read_records(path, None)
}

/// Keeps the records inside the key's year range whose offense matches.
#[must_use]
pub fn filter_records(records: Vec<IncidentRecord>, key: &ExtractKey) -> Vec<IncidentRecord> {
    use chrono::Datelike as _;

    records
        .into_iter()
        .filter(|r| key.contains_year(r.occurred_at.year()))
        .filter(|r| key.offenses.matches(&r.offense))
        .collect()
}

fn write_atomic(path: &Path, records: &[IncidentRecord]) -> Result<(), IngestError> {
    let file_name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    if let Err(e) = master::write_master(&tmp, records) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crime_atlas_incident_models::OffenseFilter;

    use super::*;
    use crate::test_support::{record, temp_dir};
    use crate::write_master;

    fn setup(name: &str) -> (PathBuf, ExtractCache) {
        let dir = temp_dir(name);
        let master_path = dir.join("master.csv");
        write_master(
            &master_path,
            &[
                record("2019-12-31 23:00:00", "THEFT", -77.0, 38.9),
                record("2020-01-05 10:00:00", "THEFT", -77.0, 38.9),
                record("2020-03-05 10:00:00", "theft", -77.0, 38.9),
                record("2020-04-05 10:00:00", "THEFT", -77.0, 38.9),
                record("2020-06-05 10:00:00", "ROBBERY", -77.0, 38.9),
                record("2021-01-05 10:00:00", "ROBBERY", -77.0, 38.9),
            ],
        )
        .unwrap();
        let cache = ExtractCache::new(master_path, dir.join("extracts"));
        (dir, cache)
    }

    fn key(start: i32, end: i32, offenses: &[&str]) -> ExtractKey {
        let filter = OffenseFilter::from_request(offenses.iter().map(|o| Some(*o)));
        ExtractKey::new(start, end, filter).unwrap()
    }

    #[test]
    fn generates_then_reuses_extract() {
        let (dir, cache) = setup("extract_idempotent");
        let k = key(2020, 2020, &["THEFT"]);

        assert!(cache.lookup(&k).unwrap().is_none());

        let first = cache.prepare(&k).unwrap();
        assert!(first.generated);
        assert_eq!(first.record_count, 3);
        assert!(first.file_name.starts_with("temp_for_processing_2020_2020_THEFT_"));

        let second = cache.prepare(&k).unwrap();
        assert!(!second.generated);
        assert_eq!(second.path, first.path);
        assert_eq!(second.record_count, 3);
        assert_eq!(cache.lookup(&k).unwrap(), Some(first.path));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn disjoint_offense_counts_sum_to_union() {
        let (dir, cache) = setup("extract_union");
        let theft = cache.prepare(&key(2019, 2021, &["THEFT"])).unwrap();
        let robbery = cache.prepare(&key(2019, 2021, &["ROBBERY"])).unwrap();
        let both = cache.prepare(&key(2019, 2021, &["ROBBERY", "THEFT"])).unwrap();
        let all = cache.prepare(&key(2019, 2021, &[])).unwrap();

        assert_eq!(theft.record_count + robbery.record_count, both.record_count);
        assert_eq!(both.record_count, all.record_count);
        assert!(all.file_name.contains("ALL_TYPES"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn no_match_and_missing_master_are_not_found() {
        let (dir, cache) = setup("extract_not_found");
        let err = cache.prepare(&key(2020, 2020, &["ARSON"])).unwrap_err();
        assert!(matches!(err, IngestError::NoMatchingData { .. }));
        assert!(err.is_not_found());

        let missing = ExtractCache::new(dir.join("missing.csv"), dir.join("extracts"));
        let err = missing.prepare(&key(2020, 2020, &[])).unwrap_err();
        assert!(matches!(err, IngestError::MasterNotFound(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn samples_first_rows() {
        let (dir, cache) = setup("extract_sample");
        let sample = cache.sample(&key(2020, 2021, &[]), 2).unwrap();
        assert_eq!(sample.records.len(), 2);
        assert_eq!(sample.total, 5);
        assert_eq!(
            sample.records[0].occurred_at.to_string(),
            "2020-01-05 10:00:00"
        );

        let extract = cache.lookup(&key(2020, 2021, &[])).unwrap().unwrap();
        assert_eq!(read_extract(&extract).unwrap().len(), 5);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn leaves_no_temporary_files() {
        let (dir, cache) = setup("extract_atomic");
        cache.prepare(&key(2020, 2020, &[])).unwrap();

        let leftovers = std::fs::read_dir(cache.extract_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
