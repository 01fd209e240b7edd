use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

pub const DEFAULT_CONFIG_FILE: &str = "wsprep.json";
pub const DEFAULT_RASTER_URL: &str = "https://mghydro.com/watersheds/rasters";
pub const DEFAULT_SHAPE_URL: &str = "https://merit.mmaelicke.de";
pub const DEFAULT_LOWRES_URL: &str =
    "https://mghydro.com/watersheds/share/catchments_simplified.zip";

/// On-disk shape of `wsprep.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub raster_url: Option<String>,
    #[serde(default)]
    pub shape_url: Option<String>,
    #[serde(default)]
    pub lowres_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// Runtime settings, built once at startup and passed by reference into
/// every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_path: Utf8PathBuf,
    pub raster_url: String,
    pub shape_url: String,
    pub lowres_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub jobs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_path: Utf8PathBuf::from("/data"),
            raster_url: DEFAULT_RASTER_URL.to_string(),
            shape_url: DEFAULT_SHAPE_URL.to_string(),
            lowres_url: DEFAULT_LOWRES_URL.to_string(),
            timeout_secs: 600,
            max_retries: 3,
            jobs: 1,
        }
    }
}

impl Settings {
    pub fn with_base_path(mut self, base_path: impl Into<Utf8PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads settings from `path`, or from `wsprep.json` in the working
    /// directory when it exists. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<Settings, PrepError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PrepError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PrepError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, PrepError> {
        let defaults = Settings::default();

        if let Some(version) = config.schema_version {
            if version != 1 {
                return Err(PrepError::ConfigParse(format!(
                    "unsupported schema_version {version}"
                )));
            }
        }

        let jobs = config.jobs.unwrap_or(defaults.jobs);
        if jobs == 0 {
            return Err(PrepError::ConfigParse("jobs must be at least 1".to_string()));
        }

        Ok(Settings {
            base_path: config
                .base_path
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.base_path),
            raster_url: config.raster_url.unwrap_or(defaults.raster_url),
            shape_url: config.shape_url.unwrap_or(defaults.shape_url),
            lowres_url: config.lowres_url.unwrap_or(defaults.lowres_url),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            jobs,
        })
    }
}
