#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the crime atlas application.
//!
//! Serves filtered extracts of the master incident table, count series,
//! ARIMA training and forecasting, area-bounded aggregation, shapefile
//! export and Getis-Ord Gi* hotspot analysis over neighborhood polygons.
//! Every JSON endpoint answers with the `{status, message, data}`
//! envelope from [`crime_atlas_server_models::ApiResponse`].

pub mod config;
pub mod error;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use crime_atlas_forecast::ModelStore;
use crime_atlas_ingest::ExtractCache;
use crime_atlas_spatial::{HotspotOptions, NeighborhoodSet};

pub use config::ServerConfig;
pub use error::ApiError;

/// Largest accepted JSON body; shapefile and hotspot requests carry whole
/// incident lists.
pub const JSON_BODY_LIMIT: usize = 256 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    /// Configuration the server was started with.
    pub config: ServerConfig,
    /// Filtered extracts of the master table.
    pub extracts: ExtractCache,
    /// Stored ARIMA models.
    pub models: ModelStore,
    /// Neighborhood boundaries, `None` if they failed to load.
    pub neighborhoods: Option<Arc<NeighborhoodSet>>,
    /// Hotspot permutation count and seed.
    pub hotspot: HotspotOptions,
}

impl AppState {
    /// Builds the state for `config` with the given boundaries.
    #[must_use]
    pub fn new(config: ServerConfig, neighborhoods: Option<Arc<NeighborhoodSet>>) -> Self {
        Self {
            extracts: ExtractCache::new(&config.master_csv, &config.extract_dir),
            models: ModelStore::new(&config.model_dir),
            hotspot: HotspotOptions {
                permutations: config.permutations,
                seed: config.hotspot_seed,
            },
            neighborhoods,
            config,
        }
    }

    /// Builds the state for `config`, loading the boundaries from
    /// `config.neighborhoods`. A missing or invalid boundary file is
    /// logged and leaves hotspot analysis unavailable.
    #[must_use]
    pub fn load(config: ServerConfig) -> Self {
        let neighborhoods = match NeighborhoodSet::load(&config.neighborhoods) {
            Ok(set) if set.is_empty() => {
                log::warn!(
                    "Neighborhood file {} has no usable polygons",
                    config.neighborhoods.display()
                );
                None
            }
            Ok(set) => Some(Arc::new(set)),
            Err(e) => {
                log::error!(
                    "Failed to load neighborhoods from {}: {e}",
                    config.neighborhoods.display()
                );
                None
            }
        };
        Self::new(config, neighborhoods)
    }
}

/// Registers the API routes and the body/query error handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| {
                ApiError::BadRequest {
                    message: "Invalid or missing JSON request body".to_string(),
                    details: Some(err.to_string()),
                }
                .into()
            }),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest {
            message: "Invalid query parameters".to_string(),
            details: Some(err.to_string()),
        }
        .into()
    }))
    .service(
        web::scope("/api")
            .route("/status", web::get().to(handlers::status))
            .route(
                "/prepare-filtered-data",
                web::post().to(handlers::prepare_filtered_data),
            )
            .route(
                "/get-processed-data-sample",
                web::get().to(handlers::processed_data_sample),
            )
            .route("/train-model", web::post().to(handlers::train_model))
            .route(
                "/get-actual-aggregated-data",
                web::get().to(handlers::actual_aggregated_data),
            )
            .route("/predict", web::post().to(handlers::predict))
            .route(
                "/get-area-aggregated-data",
                web::post().to(handlers::area_aggregated_data),
            )
            .route("/hotspot-analysis", web::post().to(handlers::hotspot_analysis)),
    )
    .route("/generate_shp", web::post().to(handlers::generate_shp));
}

/// Starts the crime atlas API server.
///
/// Reads [`ServerConfig`] from the environment, creates the working
/// directories, loads the neighborhood boundaries and starts the
/// Actix-Web HTTP server. The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if a working directory cannot be
/// created or the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();
    config.ensure_dirs()?;

    if !config.master_csv.is_file() {
        log::warn!(
            "Master table {} not found; build it with crime_atlas_ingest first",
            config.master_csv.display()
        );
    }

    let bind_addr = config.bind_addr.clone();
    let port = config.port;
    let state = web::Data::new(AppState::load(config));

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
