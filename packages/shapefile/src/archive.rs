//! Zipped shapefile export.

use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};

use geojson::Feature;

use crate::ShapefileError;
use crate::schema::infer_schema;
use crate::writer::write_point_shapefile;

/// Base name used when the requested one is empty after sanitising.
pub const DEFAULT_BASE_NAME: &str = "crime_data";

/// An in-memory zip of one shapefile layer.
#[derive(Debug, Clone)]
pub struct ShapefileArchive {
    /// Download name, `<base>.zip`.
    pub file_name: String,
    /// Zip bytes.
    pub bytes: Vec<u8>,
    /// Points written.
    pub records: usize,
    /// Features skipped for not being points.
    pub skipped: usize,
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_base_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .trim_end_matches(".zip")
        .trim_end_matches(".shp")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '_') {
        DEFAULT_BASE_NAME.to_string()
    } else {
        cleaned
    }
}

/// Removes the per-request working directory when dropped.
struct WorkDir(PathBuf);

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            log::error!("Failed to remove export folder {}: {e}", self.0.display());
        }
    }
}

/// Writes `features` as a point shapefile in a fresh folder under
/// `export_root`, zips every file of the layer, and removes the folder
/// whether or not the export succeeded.
///
/// # Errors
///
/// Returns an error if the layer cannot be written or zipped.
pub fn export_zip(
    export_root: &Path,
    base: &str,
    features: &[Feature],
) -> Result<ShapefileArchive, ShapefileError> {
    let base = sanitize_base_name(base);
    let dir = export_root.join(format!("{base}_{}", uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir)?;
    let work_dir = WorkDir(dir);

    let schema = infer_schema(features);
    let written = write_point_shapefile(&work_dir.0, &base, features, &schema)?;
    let bytes = zip_files(&written.files)?;

    log::info!(
        "Exported {} points as {base}.zip ({} bytes)",
        written.records,
        bytes.len()
    );

    Ok(ShapefileArchive {
        file_name: format!("{base}.zip"),
        bytes,
        records: written.records,
        skipped: written.skipped,
    })
}

/// Zips `files` (flat, by file name) with deflate compression.
fn zip_files(files: &[PathBuf]) -> Result<Vec<u8>, ShapefileError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        writer.write_all(&std::fs::read(path)?)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use serde_json::json;

    use super::*;
    use crate::test_support::{point_feature, temp_dir};

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_base_name("crimes 2024/ward-2"), "crimes_2024_ward-2");
        assert_eq!(sanitize_base_name("export.zip"), "export");
        assert_eq!(sanitize_base_name("../.."), "crime_data");
        assert_eq!(sanitize_base_name(""), "crime_data");
    }

    #[test]
    fn zips_layer_and_cleans_up() {
        let root = temp_dir("export");
        let features = vec![
            point_feature(-77.0, 38.9, json!({"OFFENSE": "BURGLARY"})),
            point_feature(-77.1, 38.8, json!({"OFFENSE": "ARSON"})),
        ];

        let archive = export_zip(&root, "my crimes", &features).unwrap();
        assert_eq!(archive.file_name, "my_crimes.zip");
        assert_eq!(archive.records, 2);

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        let mut names: Vec<String> = zip.file_names().map(ToString::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "my_crimes.cpg",
                "my_crimes.dbf",
                "my_crimes.prj",
                "my_crimes.shp",
                "my_crimes.shx",
            ]
        );

        let mut cpg = String::new();
        zip.by_name("my_crimes.cpg").unwrap().read_to_string(&mut cpg).unwrap();
        assert_eq!(cpg, "UTF-8");

        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn empty_export_uses_fallback_schema() {
        let root = temp_dir("empty_export");
        let archive = export_zip(&root, "nothing", &[]).unwrap();
        assert_eq!(archive.records, 0);
        assert!(!archive.bytes.is_empty());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        std::fs::remove_dir_all(&root).ok();
    }
}
