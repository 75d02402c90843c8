//! Named on-disk storage of fitted models.
//!
//! Models are encoded as `MessagePack` with field names, one file per
//! model, in a single directory.

use std::path::{Path, PathBuf};

use crate::{ArimaModel, ForecastError};

/// File extension appended to model names that lack it.
pub const MODEL_EXTENSION: &str = "arima";

/// Model name used when a request does not provide one.
pub const DEFAULT_MODEL_NAME: &str = "arima_crime_model_default";

/// Returns the file name a model is stored under.
///
/// Appends `.arima` when the name does not already end with it.
///
/// # Errors
///
/// Returns [`ForecastError::InvalidModelName`] for an empty name or one
/// containing path separators or `..`.
pub fn normalize_model_filename(name: &str) -> Result<String, ForecastError> {
    let name = name.trim();
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(ForecastError::InvalidModelName(name.to_string()));
    }

    let suffix = format!(".{MODEL_EXTENSION}");
    if name.ends_with(&suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{suffix}"))
    }
}

/// A directory of saved models.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path a model name resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::InvalidModelName`] for an unusable name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, ForecastError> {
        Ok(self.dir.join(normalize_model_filename(name)?))
    }

    /// Saves `model`, replacing any model with the same name, and returns
    /// the path written.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, encoding fails or the file
    /// cannot be written.
    pub fn save(&self, name: &str, model: &ArimaModel) -> Result<PathBuf, ForecastError> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.dir)?;

        let bytes = rmp_serde::to_vec_named(model)?;
        std::fs::write(&path, bytes)?;

        log::info!("Saved ARIMA{} model to {}", model.order(), path.display());
        Ok(path)
    }

    /// Loads the model stored under `name`.
    ///
    /// # Errors
    ///
    /// * [`ForecastError::ModelNotFound`] if no such file exists
    /// * [`ForecastError::Decode`] if the file is not a model
    pub fn load(&self, name: &str) -> Result<ArimaModel, ForecastError> {
        let path = self.path_for(name)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ForecastError::ModelNotFound(
                    path.file_name()
                        .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let model: ArimaModel = rmp_serde::from_slice(&bytes)?;
        log::debug!("Loaded model from {}", path.display());
        Ok(model)
    }
}
