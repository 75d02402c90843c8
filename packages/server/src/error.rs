//! API error type and its mapping onto HTTP status codes.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use crime_atlas_forecast::ForecastError;
use crime_atlas_forecast_models::{InvalidOrderError, ParseFrequencyError};
use crime_atlas_incident_models::InvalidYearRangeError;
use crime_atlas_ingest::IngestError;
use crime_atlas_server_models::ApiResponse;
use crime_atlas_shapefile::ShapefileError;
use crime_atlas_spatial::SpatialError;
use serde_json::Value;

/// A failed request, rendered as an error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request is malformed or asks for something the data cannot
    /// support (400).
    #[error("{message}")]
    BadRequest {
        /// Description for the client.
        message: String,
        /// Underlying error text.
        details: Option<String>,
    },

    /// A resource the request depends on does not exist (404).
    #[error("{message}")]
    NotFound {
        /// Description for the client.
        message: String,
        /// Extra payload, such as the expected file name.
        data: Option<Value>,
    },

    /// Processing failed (500).
    #[error("{message}")]
    Internal {
        /// Description for the client.
        message: String,
        /// Underlying error text.
        details: Option<String>,
    },
}

impl ApiError {
    /// A 400 without details.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    /// A 404 without payload.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            data: None,
        }
    }

    /// A 500 carrying the underlying error.
    pub fn internal(message: impl Into<String>, source: &dyn std::fmt::Display) -> Self {
        Self::Internal {
            message: message.into(),
            details: Some(source.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body: ApiResponse<Value> = match self {
            Self::BadRequest { message, details } | Self::Internal { message, details } => {
                ApiResponse::error(message.clone(), details.clone(), None)
            }
            Self::NotFound { message, data } => {
                ApiResponse::error(message.clone(), None, data.clone())
            }
        };

        log::error!(
            "API error ({}): {}{}",
            status.as_u16(),
            body.message,
            body.details
                .as_deref()
                .map_or_else(String::new, |d| format!(" - details: {d}"))
        );

        HttpResponse::build(status).json(body)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::MasterNotFound(_) | IngestError::NoMatchingData { .. } => {
                Self::not_found(e.to_string())
            }
            IngestError::InvalidYearRange(e) => e.into(),
            e => Self::internal("Failed to process incident data", &e),
        }
    }
}

impl From<ForecastError> for ApiError {
    fn from(e: ForecastError) -> Self {
        match e {
            ForecastError::Ingest(e) => e.into(),
            ForecastError::ModelNotFound(_) => Self::not_found(e.to_string()),
            ForecastError::EmptySeries
            | ForecastError::InsufficientData { .. }
            | ForecastError::InvalidParameter { .. }
            | ForecastError::InvalidModelName(_) => Self::bad_request(e.to_string()),
            e => Self::internal("Forecasting failed", &e),
        }
    }
}

impl From<SpatialError> for ApiError {
    fn from(e: SpatialError) -> Self {
        if e.is_refusal() {
            Self::bad_request(e.to_string())
        } else {
            Self::internal("Hotspot analysis failed", &e)
        }
    }
}

impl From<ShapefileError> for ApiError {
    fn from(e: ShapefileError) -> Self {
        Self::internal("Failed to generate shapefile", &e)
    }
}

impl From<InvalidYearRangeError> for ApiError {
    fn from(e: InvalidYearRangeError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<ParseFrequencyError> for ApiError {
    fn from(e: ParseFrequencyError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<InvalidOrderError> for ApiError {
    fn from(e: InvalidOrderError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        Self::internal("Background task failed", &e)
    }
}
