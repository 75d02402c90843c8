//! HTTP handler functions for the crime atlas API.

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use crime_atlas_forecast::{
    ArimaModel, DEFAULT_MODEL_NAME, MAX_FORECAST_STEPS, aggregate, aggregate_extract,
    normalize_model_filename,
};
use crime_atlas_forecast_models::{ArimaOrder, Frequency};
use crime_atlas_incident_models::{BoundingBox, ExtractKey, OffenseFilter};
use crime_atlas_ingest::{AreaQuery, query_area, read_master};
use crime_atlas_server_models::{
    ApiResponse, AreaData, AreaFilters, AreaRequest, FiltersApplied, HotspotRequest,
    MissingExtractData, PredictData, PredictRequest, PrepareData, PrepareRequest, SampleData,
    ShapefileRequest, StatusData, TrainData, TrainRequest, offense_filter,
};
use crime_atlas_shapefile::{DEFAULT_BASE_NAME, export_zip};
use crime_atlas_spatial::analyze_hotspots;
use geo::Point;
use serde::Serialize;

use crate::{ApiError, AppState};

/// Rows returned by the sample endpoint when no limit is given.
const DEFAULT_SAMPLE_LIMIT: usize = 20;

/// Characters of the fit summary returned after training.
const SUMMARY_PREVIEW_CHARS: usize = 2000;

/// Confidence level used when a forecast request does not give one.
const DEFAULT_CONFIDENCE_LEVEL: f64 = 95.0;

/// Frequency used by the area endpoint when none is given.
const DEFAULT_AREA_FREQUENCY: &str = "ME";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn success<T: Serialize>(message: String, data: T) -> HttpResponse {
    log::info!("API success: {message}");
    HttpResponse::Ok().json(ApiResponse::success(message, data))
}

/// Raw query pairs; keys may repeat.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Every value of `key`, with comma-separated values split.
    fn all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, v)| v.split(','))
            .collect()
    }

    fn year(&self, key: &str) -> Result<i32, ApiError> {
        self.first(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                ApiError::bad_request(
                    "start_year and end_year query parameters are required and must be integers",
                )
            })
    }

    fn extract_key(&self) -> Result<ExtractKey, ApiError> {
        let offenses = OffenseFilter::from_request(self.all("offenses").into_iter().map(Some));
        Ok(ExtractKey::new(
            self.year("start_year")?,
            self.year("end_year")?,
            offenses,
        )?)
    }
}

fn filters_applied(key: &ExtractKey, limit: Option<usize>) -> FiltersApplied {
    FiltersApplied {
        start_year: key.start_year,
        end_year: key.end_year,
        offenses: key.offenses.to_list(),
        limit,
    }
}

/// `GET /api/status`
pub async fn status(state: web::Data<AppState>) -> HttpResponse {
    let master_data_found = state.extracts.master_exists();
    let community_boundaries_loaded = state
        .neighborhoods
        .as_ref()
        .is_some_and(|set| !set.is_empty());

    let mut message = vec!["API is running.".to_string()];
    if !master_data_found {
        log::warn!(
            "Master table {} not found during status check",
            state.extracts.master_path().display()
        );
        message.push(format!(
            "Warning: master data file ({}) not found; run the ingest pipeline first.",
            state.extracts.master_path().display()
        ));
    }
    if !community_boundaries_loaded {
        log::warn!("Neighborhood boundaries not loaded during status check");
        message.push(
            "Warning: neighborhood boundaries are not loaded; hotspot analysis is unavailable."
                .to_string(),
        );
    }

    success(
        message.join(" "),
        StatusData {
            master_data_found,
            community_boundaries_loaded,
        },
    )
}

/// `POST /api/prepare-filtered-data`
///
/// Generates the filtered extract for a year range and offense set, or
/// reuses the one already on disk.
pub async fn prepare_filtered_data(
    state: web::Data<AppState>,
    body: web::Json<PrepareRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let key = ExtractKey::new(
        body.start_year,
        body.end_year,
        offense_filter(body.offenses.as_ref()),
    )?;
    let filters = filters_applied(&key, None);

    let extract = web::block(move || state.extracts.prepare(&key)).await??;

    let message = if extract.generated {
        format!(
            "Prepared {} records into {}",
            extract.record_count, extract.file_name
        )
    } else {
        format!(
            "Using existing extract {} ({} records)",
            extract.file_name, extract.record_count
        )
    };

    Ok(success(
        message,
        PrepareData {
            temp_filename_generated: extract.file_name,
            num_records_prepared: extract.record_count,
            filters_applied: filters,
        },
    ))
}

/// `GET /api/get-processed-data-sample`
///
/// Query: `start_year`, `end_year`, `offenses` (repeatable or
/// comma-separated), `limit`.
pub async fn processed_data_sample(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    let params = QueryParams(query.into_inner());
    let key = params.extract_key()?;
    let limit = match params.first("limit") {
        None => DEFAULT_SAMPLE_LIMIT,
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::bad_request("limit must be a non-negative integer"))?,
    };
    let filters = filters_applied(&key, Some(limit));

    let sample = web::block(move || state.extracts.sample(&key, limit)).await??;

    Ok(success(
        format!(
            "Loaded {} sample records; {} records match the filter",
            sample.records.len(),
            sample.total
        ),
        SampleData {
            sample_data: sample.records,
            total_matching_records: sample.total,
            temp_filename_used: sample.file_name,
            filters_applied: filters,
        },
    ))
}

/// `POST /api/train-model`
///
/// Fits an ARIMA model on a previously prepared extract and stores it.
pub async fn train_model(
    state: web::Data<AppState>,
    body: web::Json<TrainRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let frequency: Frequency = body.resample_freq.parse()?;
    let order = ArimaOrder::try_from_slice(&body.arima_order)?;
    let key = ExtractKey::new(
        body.start_year,
        body.end_year,
        offense_filter(body.offenses.as_ref()),
    )?;
    let model_name = body
        .model_filename
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
    let model_file = normalize_model_filename(&model_name)?;

    let (source, series_len, preview, path) = web::block(move || -> Result<_, ApiError> {
        let file_name = state.extracts.file_name(&key)?;
        let Some(extract) = state.extracts.lookup(&key)? else {
            return Err(ApiError::NotFound {
                message: format!(
                    "Training data {file_name} has not been prepared; \
                     call /api/prepare-filtered-data first"
                ),
                data: serde_json::to_value(MissingExtractData {
                    expected_temp_file: file_name,
                })
                .ok(),
            });
        };

        let series = aggregate_extract(&extract, frequency)?;
        let model = ArimaModel::fit(&series, order)?;
        let path = state.models.save(&model_name, &model)?;
        Ok((
            file_name,
            series.len(),
            model.summary_preview(SUMMARY_PREVIEW_CHARS),
            path,
        ))
    })
    .await??;

    Ok(success(
        format!("Model '{model_file}' trained successfully"),
        TrainData {
            model_filename_used: model_file,
            model_path_on_server: path.display().to_string(),
            model_summary_preview: preview,
            training_data_source: source,
            time_series_length: series_len,
        },
    ))
}

/// `GET /api/get-actual-aggregated-data`
///
/// Query: `start_year`, `end_year`, `offenses`, `resample_freq`. The
/// extract is generated if it does not exist yet.
pub async fn actual_aggregated_data(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    let params = QueryParams(query.into_inner());
    let key = params.extract_key()?;
    let frequency: Frequency = params
        .first("resample_freq")
        .ok_or_else(|| ApiError::bad_request("resample_freq query parameter is required"))?
        .parse()?;

    let (series, file_name) = web::block(move || -> Result<_, ApiError> {
        let extract = state.extracts.prepare(&key)?;
        let series = aggregate_extract(&extract.path, frequency)?;
        Ok((series.to_chart(), extract.file_name))
    })
    .await??;

    Ok(success(
        format!(
            "Aggregated {} {frequency} buckets from {file_name}",
            series.len()
        ),
        series,
    ))
}

/// `POST /api/predict`
///
/// Forecasts `steps` buckets past the end of a stored model's series.
pub async fn predict(
    state: web::Data<AppState>,
    body: web::Json<PredictRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let steps = usize::try_from(body.steps)
        .ok()
        .filter(|s| (1..=MAX_FORECAST_STEPS).contains(s))
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "steps must be an integer between 1 and {MAX_FORECAST_STEPS}"
            ))
        })?;
    let level = body.confidence_level.unwrap_or(DEFAULT_CONFIDENCE_LEVEL);
    if !(level > 0.0 && level < 100.0) {
        return Err(ApiError::bad_request(
            "confidence_level must be between 0 and 100 (exclusive)",
        ));
    }
    let alpha = 1.0 - level / 100.0;
    let model_name = body
        .model_filename
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
    let model_file = normalize_model_filename(&model_name)?;

    let predictions = web::block(move || -> Result<_, ApiError> {
        let model = state.models.load(&model_name)?;
        Ok(model.forecast(steps, alpha)?)
    })
    .await??;

    Ok(success(
        format!("Forecast {steps} steps with model '{model_file}' at {level}% confidence"),
        PredictData {
            predictions,
            model_used: model_file,
        },
    ))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ApiError::bad_request(format!("{field} must be a date in YYYY-MM-DD format")))
}

/// `POST /api/get-area-aggregated-data`
///
/// Counts incidents inside a bounding box and date range per bucket. An
/// area with no incidents yields empty arrays, not an error.
pub async fn area_aggregated_data(
    state: web::Data<AppState>,
    body: web::Json<AreaRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    let bbox = match (&body.geojson, &body.bounds) {
        (Some(geojson), _) => geojson
            .bbox
            .as_deref()
            .and_then(BoundingBox::from_slice)
            .ok_or_else(|| {
                ApiError::bad_request(
                    "geojson.bbox must be a list of four numbers [minLng, minLat, maxLng, maxLat]",
                )
            })?,
        (None, Some(bounds)) => BoundingBox::parse(bounds).ok_or_else(|| {
            ApiError::bad_request("bounds must be formatted as 'minLng,minLat,maxLng,maxLat'")
        })?,
        (None, None) => {
            return Err(ApiError::bad_request(
                "An area is required: send geojson with a bbox or a bounds string",
            ));
        }
    };

    let start_date = parse_date("start_date", &body.start_date)?;
    let end_date = parse_date("end_date", &body.end_date)?;
    if start_date > end_date {
        return Err(ApiError::bad_request(
            "start_date cannot be later than end_date",
        ));
    }

    let frequency: Frequency = body
        .resample_freq
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_AREA_FREQUENCY)
        .parse()?;
    let offenses =
        OffenseFilter::from_request(body.offenses.iter().flatten().map(Option::as_deref));

    if !state.extracts.master_exists() {
        return Err(ApiError::not_found(format!(
            "Master data file {} not found",
            state.extracts.master_path().display()
        )));
    }

    let filters = AreaFilters {
        bounds: bbox.to_array(),
        start_date: start_date.format(DATE_FORMAT).to_string(),
        end_date: end_date.format(DATE_FORMAT).to_string(),
        offenses: offenses.to_list(),
        resample_freq: frequency.to_string(),
    };
    let query = AreaQuery {
        bbox,
        start_date,
        end_date,
        offenses,
    };

    let (series, matched) = web::block(move || -> Result<_, ApiError> {
        let table = read_master(state.extracts.master_path())?;
        let timestamps: Vec<_> = query_area(&table.records, &query)
            .into_iter()
            .map(|r| r.occurred_at)
            .collect();
        Ok((aggregate(&timestamps, frequency).to_chart(), timestamps.len()))
    })
    .await??;

    let message = if matched == 0 {
        "No incidents match the area, dates and offenses".to_string()
    } else {
        format!(
            "Aggregated {matched} incidents into {} {frequency} buckets",
            series.len()
        )
    };

    Ok(success(
        message,
        AreaData {
            timestamps: series.timestamps,
            values: series.values,
            filters_applied: filters,
        },
    ))
}

/// `POST /generate_shp`
///
/// Returns the posted point features as a zipped shapefile download.
pub async fn generate_shp(
    state: web::Data<AppState>,
    body: web::Json<ShapefileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let Some(features) = body.features else {
        return Err(ApiError::bad_request("Missing 'features' in request body"));
    };
    let base = body
        .filename
        .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());

    let archive =
        web::block(move || export_zip(&state.config.export_dir, &base, &features)).await??;

    log::info!(
        "API success: shapefile {} with {} points ({} skipped)",
        archive.file_name,
        archive.records,
        archive.skipped
    );

    Ok(HttpResponse::Ok()
        .content_type("application/zip")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", archive.file_name),
        ))
        .body(archive.bytes))
}

/// `POST /api/hotspot-analysis`
///
/// Responds with a bare `GeoJSON` feature collection of per-neighborhood
/// Gi* statistics.
pub async fn hotspot_analysis(
    state: web::Data<AppState>,
    body: web::Json<HotspotRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let max_distance = body.max_distance;
    let crime_data = body.crime_data.unwrap_or_default();
    if crime_data.is_empty() {
        return Err(ApiError::bad_request(
            "crimeData is required and must not be empty",
        ));
    }

    let Some(neighborhoods) = state.neighborhoods.clone() else {
        return Err(ApiError::Internal {
            message: "Neighborhood boundaries are not loaded; hotspot analysis is unavailable"
                .to_string(),
            details: None,
        });
    };

    let points: Vec<Point<f64>> = crime_data
        .iter()
        .filter_map(|p| Some(Point::new(p.longitude?, p.latitude?)))
        .collect();
    if points.is_empty() {
        return Err(ApiError::bad_request(
            "No entry in crimeData has both longitude and latitude",
        ));
    }
    if points.len() < crime_data.len() {
        log::warn!(
            "Ignoring {} crimeData entries without coordinates",
            crime_data.len() - points.len()
        );
    }

    let options = state.hotspot;
    let report =
        web::block(move || analyze_hotspots(&neighborhoods, &points, max_distance, options))
            .await??;

    log::info!(
        "API success: hotspot analysis of {} regions (band {:.2} m, {} islands removed)",
        report.collection.features.len(),
        report.threshold,
        report.removed_islands.len()
    );

    Ok(HttpResponse::Ok().json(report.collection))
}
