#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Export of `GeoJSON` point features as a zipped ESRI shapefile.

pub mod archive;
pub mod schema;
pub mod writer;

pub use archive::{DEFAULT_BASE_NAME, ShapefileArchive, export_zip, sanitize_base_name};
pub use schema::{FieldDef, FieldKind, Schema, infer_schema};
pub use writer::{WrittenShapefile, write_point_shapefile};

/// Errors that can occur while writing or zipping a shapefile.
#[derive(Debug, thiserror::Error)]
pub enum ShapefileError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The layer exceeds a size limit of the format.
    #[error("Shapefile too large: {bytes} bytes exceeds the format limit")]
    TooLarge {
        /// Size that overflowed.
        bytes: usize,
    },
}
