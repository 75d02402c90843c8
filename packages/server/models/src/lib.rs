#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the crime atlas server.
//!
//! Every JSON endpoint except the hotspot analysis answers with an
//! [`ApiResponse`] envelope. Request bodies are deserialised into the
//! `*Request` types; numeric and range validation happens in the handlers.

use crime_atlas_forecast_models::ForecastPoint;
use crime_atlas_incident_models::{IncidentRecord, OffenseFilter};
use serde::{Deserialize, Serialize};

/// Outcome marker of an [`ApiResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    /// The request succeeded.
    Success,
    /// The request failed.
    Error,
}

/// Uniform response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Outcome.
    pub status: ApiStatus,
    /// Human-readable description of the outcome.
    pub message: String,
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Underlying error text, for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A success envelope carrying `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
            data: Some(data),
            details: None,
        }
    }

    /// An error envelope.
    pub fn error(message: impl Into<String>, details: Option<String>, data: Option<T>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            data,
            details,
        }
    }
}

/// Offenses as sent by clients: a list (possibly containing nulls) or a
/// single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffenseSelection {
    /// `["THEFT/OTHER", "ROBBERY"]`
    Many(Vec<Option<String>>),
    /// `"THEFT/OTHER"`
    One(String),
}

impl OffenseSelection {
    /// Normalises the selection into an [`OffenseFilter`].
    #[must_use]
    pub fn to_filter(&self) -> OffenseFilter {
        match self {
            Self::Many(items) => OffenseFilter::from_request(items.iter().map(Option::as_deref)),
            Self::One(item) => OffenseFilter::from_request([Some(item.as_str())]),
        }
    }
}

/// Converts an optional selection, where absence means every offense.
#[must_use]
pub fn offense_filter(selection: Option<&OffenseSelection>) -> OffenseFilter {
    selection.map_or(OffenseFilter::All, OffenseSelection::to_filter)
}

/// `GET /api/status` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    /// Whether the master table exists.
    pub master_data_found: bool,
    /// Whether neighborhood boundaries were loaded at start-up.
    pub community_boundaries_loaded: bool,
}

/// Body of `POST /api/prepare-filtered-data`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareRequest {
    /// First year kept.
    pub start_year: i32,
    /// Last year kept.
    pub end_year: i32,
    /// Offenses kept; all when absent.
    #[serde(default)]
    pub offenses: Option<OffenseSelection>,
}

/// The year and offense filter echoed back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltersApplied {
    /// First year kept.
    pub start_year: i32,
    /// Last year kept.
    pub end_year: i32,
    /// Normalised offenses, `["ALL"]` when unfiltered.
    pub offenses: Vec<String>,
    /// Row limit, for sample requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `POST /api/prepare-filtered-data` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareData {
    /// File name of the extract.
    pub temp_filename_generated: String,
    /// Rows in the extract.
    pub num_records_prepared: usize,
    /// Filter used.
    pub filters_applied: FiltersApplied,
}

/// `GET /api/get-processed-data-sample` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleData {
    /// First rows of the extract.
    pub sample_data: Vec<IncidentRecord>,
    /// Rows in the whole extract.
    pub total_matching_records: usize,
    /// File name of the extract.
    pub temp_filename_used: String,
    /// Filter used.
    pub filters_applied: FiltersApplied,
}

/// Body of `POST /api/train-model`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainRequest {
    /// First year of the training extract.
    pub start_year: i32,
    /// Last year of the training extract.
    pub end_year: i32,
    /// Offenses of the training extract.
    #[serde(default)]
    pub offenses: Option<OffenseSelection>,
    /// Resampling frequency alias, e.g. `"ME"`.
    pub resample_freq: String,
    /// `[p, d, q]`.
    pub arima_order: Vec<i64>,
    /// Name to store the model under.
    #[serde(default)]
    pub model_filename: Option<String>,
}

/// `POST /api/train-model` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainData {
    /// File name the model was stored under.
    pub model_filename_used: String,
    /// Full path of the stored model.
    pub model_path_on_server: String,
    /// Beginning of the fit summary.
    pub model_summary_preview: String,
    /// Extract the model was fitted on.
    pub training_data_source: String,
    /// Buckets in the training series.
    pub time_series_length: usize,
}

/// Payload of the 404 returned when training before preparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingExtractData {
    /// Extract file name the request maps to.
    pub expected_temp_file: String,
}

/// Body of `POST /api/predict`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// Number of buckets to forecast.
    pub steps: i64,
    /// Stored model to use.
    #[serde(default)]
    pub model_filename: Option<String>,
    /// Confidence level in percent.
    #[serde(default)]
    pub confidence_level: Option<f64>,
}

/// `POST /api/predict` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictData {
    /// One point per forecast step.
    pub predictions: Vec<ForecastPoint>,
    /// File name of the model used.
    pub model_used: String,
}

/// The part of a `GeoJSON` object the area endpoint reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaGeoJson {
    /// `[minLng, minLat, maxLng, maxLat]`.
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
}

/// Body of `POST /api/get-area-aggregated-data`.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaRequest {
    /// Object carrying a `bbox`; takes precedence over `bounds`.
    #[serde(default)]
    pub geojson: Option<AreaGeoJson>,
    /// `"minLng,minLat,maxLng,maxLat"`.
    #[serde(default)]
    pub bounds: Option<String>,
    /// First day, `YYYY-MM-DD`.
    pub start_date: String,
    /// Last day, `YYYY-MM-DD`, included.
    pub end_date: String,
    /// Offenses kept; all when absent or null.
    #[serde(default)]
    pub offenses: Option<Vec<Option<String>>>,
    /// Resampling frequency alias; `"ME"` when absent.
    #[serde(default)]
    pub resample_freq: Option<String>,
}

/// Filter echoed back by the area endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaFilters {
    /// `[minLng, minLat, maxLng, maxLat]`.
    pub bounds: [f64; 4],
    /// First day.
    pub start_date: String,
    /// Last day.
    pub end_date: String,
    /// Normalised offenses, `["ALL"]` when unfiltered.
    pub offenses: Vec<String>,
    /// Frequency used.
    pub resample_freq: String,
}

/// `POST /api/get-area-aggregated-data` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaData {
    /// Bucket labels.
    pub timestamps: Vec<String>,
    /// Counts, aligned with `timestamps`.
    pub values: Vec<f64>,
    /// Filter used.
    pub filters_applied: AreaFilters,
}

/// Body of `POST /generate_shp`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShapefileRequest {
    /// Point features to export.
    #[serde(default)]
    pub features: Option<Vec<geojson::Feature>>,
    /// Base name of the download.
    #[serde(default)]
    pub filename: Option<String>,
}

/// One incident sent for hotspot analysis.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimePoint {
    /// Longitude (WGS 84).
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Latitude (WGS 84).
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Offense category, informational.
    #[serde(default)]
    pub offense_type: Option<String>,
}

/// Body of `POST /api/hotspot-analysis`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotRequest {
    /// Incidents to analyse.
    #[serde(default)]
    pub crime_data: Option<Vec<CrimePoint>>,
    /// Distance band in metres; estimated when absent.
    #[serde(default)]
    pub max_distance: Option<f64>,
}
