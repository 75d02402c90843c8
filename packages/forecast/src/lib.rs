#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Count-series aggregation and ARIMA forecasting.
//!
//! Extracts are resampled into fixed-frequency count series
//! ([`aggregate`]), fitted with an ARIMA(p, d, q) model ([`ArimaModel`]),
//! persisted by name ([`ModelStore`]) and later reloaded to forecast with
//! confidence intervals.

pub mod aggregate;
pub mod arima;
pub mod evaluate;
mod linalg;
pub mod store;

pub use aggregate::{CountSeries, aggregate, aggregate_extract};
pub use arima::{ArimaModel, MAX_FORECAST_STEPS};
pub use evaluate::{HoldoutEvaluation, evaluate_holdout, rmse};
pub use store::{DEFAULT_MODEL_NAME, MODEL_EXTENSION, ModelStore, normalize_model_filename};

use crime_atlas_ingest::IngestError;

/// Errors that can occur while aggregating, fitting, storing or
/// forecasting.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading the extract failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Encoding a model failed.
    #[error("Model encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Decoding a model failed.
    #[error("Model decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The series has no observations.
    #[error("Time series is empty")]
    EmptySeries,

    /// The series is too short for the requested order.
    #[error("Too few data points ({actual}) to fit the model; at least {required} are needed")]
    InsufficientData {
        /// Minimum number of observations.
        required: usize,
        /// Observations available.
        actual: usize,
    },

    /// A forecast or fit parameter is out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },

    /// Estimation produced non-finite coefficients or variance.
    #[error("Model fitting failed: {message}")]
    FitFailed {
        /// Description of what went wrong.
        message: String,
    },

    /// A model name contains path components or is empty.
    #[error("Invalid model file name: {0}")]
    InvalidModelName(String),

    /// No model file exists under the given name.
    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}
