//! ESRI point shapefile writer.
//!
//! Produces the five sidecar files of a point layer:
//!
//! * `.shp`: point geometries
//! * `.shx`: record offsets into `.shp`
//! * `.dbf`: dBASE III attribute table
//! * `.prj`: WGS 84 coordinate system
//! * `.cpg`: attribute encoding (`UTF-8`)

use std::path::{Path, PathBuf};

use chrono::Datelike as _;
use geojson::Feature;

use crate::ShapefileError;
use crate::schema::{FieldKind, Schema, format_value, truncate_bytes};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const SHAPE_TYPE_POINT: i32 = 1;
const HEADER_LEN: usize = 100;
/// Shape type plus two coordinates.
const POINT_CONTENT_LEN: usize = 20;
const RECORD_HEADER_LEN: usize = 8;

const DBF_VERSION: u8 = 0x03;
const DBF_HEADER_TERMINATOR: u8 = 0x0D;
const DBF_EOF: u8 = 0x1A;

/// WGS 84 in ESRI WKT.
pub const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

/// Attribute encoding written to the `.cpg` file.
pub const ENCODING: &str = "UTF-8";

/// Files written for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenShapefile {
    /// Paths of every file written.
    pub files: Vec<PathBuf>,
    /// Points written.
    pub records: usize,
    /// Features skipped for not being points.
    pub skipped: usize,
}

/// A point with the feature it came from.
struct PointRecord<'a> {
    x: f64,
    y: f64,
    feature: &'a Feature,
}

/// Writes `features` as a point layer named `base` in `dir`.
///
/// Features without a point geometry are skipped with a warning.
///
/// # Errors
///
/// Returns an error if a file cannot be written or the layer is too large
/// for the format.
pub fn write_point_shapefile(
    dir: &Path,
    base: &str,
    features: &[Feature],
    schema: &Schema,
) -> Result<WrittenShapefile, ShapefileError> {
    let points = collect_points(features);
    let skipped = features.len() - points.len();

    let (shp, shx) = encode_geometry(&points)?;
    let dbf = encode_attributes(&points, schema)?;

    let files = vec![
        dir.join(format!("{base}.shp")),
        dir.join(format!("{base}.shx")),
        dir.join(format!("{base}.dbf")),
        dir.join(format!("{base}.prj")),
        dir.join(format!("{base}.cpg")),
    ];
    std::fs::write(&files[0], shp)?;
    std::fs::write(&files[1], shx)?;
    std::fs::write(&files[2], dbf)?;
    std::fs::write(&files[3], WGS84_PRJ)?;
    std::fs::write(&files[4], ENCODING)?;

    log::info!(
        "Wrote {} points to {} ({skipped} skipped)",
        points.len(),
        files[0].display()
    );

    Ok(WrittenShapefile {
        files,
        records: points.len(),
        skipped,
    })
}

fn collect_points(features: &[Feature]) -> Vec<PointRecord<'_>> {
    features
        .iter()
        .filter_map(|feature| {
            let value = feature.geometry.as_ref().map(|g| &g.value);
            match value {
                Some(geojson::Value::Point(coords))
                    if coords.len() >= 2 && coords[0].is_finite() && coords[1].is_finite() =>
                {
                    Some(PointRecord {
                        x: coords[0],
                        y: coords[1],
                        feature,
                    })
                }
                other => {
                    log::warn!(
                        "Skipping non-point geometry {} for feature with OFFENSE {}",
                        other.map_or("null", geometry_type),
                        feature
                            .property("OFFENSE")
                            .map_or_else(|| "N/A".to_string(), ToString::to_string)
                    );
                    None
                }
            }
        })
        .collect()
}

const fn geometry_type(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Length in 16-bit words, as stored in shapefile headers.
fn words(bytes: usize) -> Result<i32, ShapefileError> {
    i32::try_from(bytes / 2).map_err(|_| ShapefileError::TooLarge { bytes })
}

fn shape_header(file_len: usize, bbox: [f64; 4]) -> Result<Vec<u8>, ShapefileError> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&FILE_CODE.to_be_bytes());
    header.extend_from_slice(&[0u8; 20]);
    header.extend_from_slice(&words(file_len)?.to_be_bytes());
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.extend_from_slice(&SHAPE_TYPE_POINT.to_le_bytes());
    for value in bbox {
        header.extend_from_slice(&value.to_le_bytes());
    }
    // Z and M ranges are unused for 2D points.
    header.extend_from_slice(&[0u8; 32]);
    Ok(header)
}

fn encode_geometry(points: &[PointRecord<'_>]) -> Result<(Vec<u8>, Vec<u8>), ShapefileError> {
    let bbox = points.iter().fold(None, |acc: Option<[f64; 4]>, p| {
        Some(acc.map_or([p.x, p.y, p.x, p.y], |b| {
            [b[0].min(p.x), b[1].min(p.y), b[2].max(p.x), b[3].max(p.y)]
        }))
    });
    let bbox = bbox.unwrap_or([0.0; 4]);

    let record_len = RECORD_HEADER_LEN + POINT_CONTENT_LEN;
    let shp_len = HEADER_LEN + points.len() * record_len;
    let shx_len = HEADER_LEN + points.len() * 8;

    let mut shp = shape_header(shp_len, bbox)?;
    let mut shx = shape_header(shx_len, bbox)?;
    shp.reserve(shp_len - HEADER_LEN);
    shx.reserve(shx_len - HEADER_LEN);

    let content_words = words(POINT_CONTENT_LEN)?;
    for (i, point) in points.iter().enumerate() {
        let offset = words(shp.len())?;
        let number = i32::try_from(i + 1).map_err(|_| ShapefileError::TooLarge { bytes: shp_len })?;

        shp.extend_from_slice(&number.to_be_bytes());
        shp.extend_from_slice(&content_words.to_be_bytes());
        shp.extend_from_slice(&SHAPE_TYPE_POINT.to_le_bytes());
        shp.extend_from_slice(&point.x.to_le_bytes());
        shp.extend_from_slice(&point.y.to_le_bytes());

        shx.extend_from_slice(&offset.to_be_bytes());
        shx.extend_from_slice(&content_words.to_be_bytes());
    }

    Ok((shp, shx))
}

fn encode_attributes(points: &[PointRecord<'_>], schema: &Schema) -> Result<Vec<u8>, ShapefileError> {
    let field_count = schema.fields.len();
    let header_len = 32 + 32 * field_count + 1;
    let record_len = schema.record_length();

    let header_len_u16 =
        u16::try_from(header_len).map_err(|_| ShapefileError::TooLarge { bytes: header_len })?;
    let record_len_u16 =
        u16::try_from(record_len).map_err(|_| ShapefileError::TooLarge { bytes: record_len })?;
    let record_count = u32::try_from(points.len()).map_err(|_| ShapefileError::TooLarge {
        bytes: points.len() * record_len,
    })?;

    let mut dbf = Vec::with_capacity(header_len + points.len() * record_len + 1);

    let today = chrono::Utc::now().date_naive();
    dbf.push(DBF_VERSION);
    dbf.push(u8::try_from(today.year() - 1900).unwrap_or(u8::MAX));
    dbf.push(u8::try_from(today.month()).unwrap_or(1));
    dbf.push(u8::try_from(today.day()).unwrap_or(1));
    dbf.extend_from_slice(&record_count.to_le_bytes());
    dbf.extend_from_slice(&header_len_u16.to_le_bytes());
    dbf.extend_from_slice(&record_len_u16.to_le_bytes());
    dbf.extend_from_slice(&[0u8; 20]);

    for field in &schema.fields {
        let mut descriptor = [0u8; 32];
        let name = truncate_bytes(&field.name, 10).as_bytes();
        descriptor[..name.len()].copy_from_slice(name);
        descriptor[11] = field.kind.type_code();
        descriptor[16] = field.kind.length();
        descriptor[17] = field.kind.decimals();
        dbf.extend_from_slice(&descriptor);
    }
    dbf.push(DBF_HEADER_TERMINATOR);

    for point in points {
        dbf.push(b' ');
        for field in &schema.fields {
            let value = point
                .feature
                .properties
                .as_ref()
                .and_then(|props| props.get(&field.property));
            let text = format_value(field, value).unwrap_or_default();
            pad_field(&mut dbf, &text, field.kind);
        }
    }
    dbf.push(DBF_EOF);

    Ok(dbf)
}

/// Appends `text` padded with spaces to the field width: text fields are
/// left aligned, numbers right aligned.
fn pad_field(out: &mut Vec<u8>, text: &str, kind: FieldKind) {
    let width = usize::from(kind.length());
    let text = truncate_bytes(text, width).as_bytes();
    let padding = width - text.len();
    match kind {
        FieldKind::Character { .. } => {
            out.extend_from_slice(text);
            out.resize(out.len() + padding, b' ');
        }
        FieldKind::Numeric { .. } => {
            out.resize(out.len() + padding, b' ');
            out.extend_from_slice(text);
        }
    }
}
