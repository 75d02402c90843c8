//! Server configuration read from the environment.

use std::path::{Path, PathBuf};

use crime_atlas_ingest::ensure_dir;
use crime_atlas_spatial::DEFAULT_PERMUTATIONS;

/// File name of the master table inside `<data>/processed`.
pub const MASTER_FILE_NAME: &str = "master_crime_data_2014-2024.csv";

/// File name of the neighborhood boundaries inside the data directory.
pub const NEIGHBORHOODS_FILE_NAME: &str = "Neighborhood_Clusters.json";

/// Paths and tuning for one server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Master incident table.
    pub master_csv: PathBuf,
    /// Directory of filtered extracts.
    pub extract_dir: PathBuf,
    /// Directory of stored models.
    pub model_dir: PathBuf,
    /// Scratch directory for shapefile exports.
    pub export_dir: PathBuf,
    /// Neighborhood boundary `GeoJSON`.
    pub neighborhoods: PathBuf,
    /// Permutations for hotspot pseudo p-values.
    pub permutations: usize,
    /// Fixed seed for hotspot analysis, random when unset.
    pub hotspot_seed: Option<u64>,
}

impl ServerConfig {
    /// Default layout under `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: &Path) -> Self {
        let processed = data_dir.join("processed");
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5000,
            master_csv: processed.join(MASTER_FILE_NAME),
            extract_dir: processed.join("extracts"),
            model_dir: data_dir.join("models"),
            export_dir: data_dir.join("exports"),
            neighborhoods: data_dir.join(NEIGHBORHOODS_FILE_NAME),
            permutations: DEFAULT_PERMUTATIONS,
            hotspot_seed: None,
        }
    }

    /// Reads `BIND_ADDR`, `PORT` and the `CRIME_ATLAS_*` variables,
    /// falling back to the layout under `data/`.
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = env_path("CRIME_ATLAS_DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        let defaults = Self::with_data_dir(&data_dir);

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: env_parse("PORT").unwrap_or(defaults.port),
            master_csv: env_path("CRIME_ATLAS_MASTER_CSV").unwrap_or(defaults.master_csv),
            extract_dir: env_path("CRIME_ATLAS_EXTRACT_DIR").unwrap_or(defaults.extract_dir),
            model_dir: env_path("CRIME_ATLAS_MODEL_DIR").unwrap_or(defaults.model_dir),
            export_dir: env_path("CRIME_ATLAS_EXPORT_DIR").unwrap_or(defaults.export_dir),
            neighborhoods: env_path("CRIME_ATLAS_NEIGHBORHOODS")
                .unwrap_or(defaults.neighborhoods),
            permutations: env_parse("CRIME_ATLAS_PERMUTATIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.permutations),
            hotspot_seed: env_parse("CRIME_ATLAS_HOTSPOT_SEED"),
        }
    }

    /// Creates the extract, model and export directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.extract_dir, &self.model_dir, &self.export_dir] {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring unparsable {key}={value}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let config = ServerConfig::with_data_dir(Path::new("/srv/atlas"));
        assert_eq!(
            config.master_csv,
            Path::new("/srv/atlas/processed/master_crime_data_2014-2024.csv")
        );
        assert_eq!(config.extract_dir, Path::new("/srv/atlas/processed/extracts"));
        assert_eq!(config.model_dir, Path::new("/srv/atlas/models"));
        assert_eq!(config.neighborhoods, Path::new("/srv/atlas/Neighborhood_Clusters.json"));
        assert_eq!(config.port, 5000);
        assert_eq!(config.permutations, DEFAULT_PERMUTATIONS);
    }
}
