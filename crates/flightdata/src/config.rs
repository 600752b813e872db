//! Configuration management for flightdata.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::terrain::DEFAULT_MAX_TILES;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "flightdata";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "flights.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FLIGHTDATA_`, sections split by `__`)
/// 2. TOML config file at `~/.config/flightdata/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool configuration.
    pub pipeline: PipelineConfig,
    /// Terrain tile configuration.
    pub terrain: TerrainConfig,
    /// Parser thresholds.
    pub parsing: ParsingConfig,
    /// Airframe aliasing.
    pub airframes: AirframeConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files processed concurrently. 0 uses the number of CPUs.
    pub parallelism: usize,
    /// Steps computed concurrently per pipeline. 0 uses the number of CPUs.
    pub step_parallelism: usize,
}

/// Terrain tile configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Root of the SRTM tile tree. AGL is not computed when unset.
    pub directory: Option<PathBuf>,
    /// Maximum number of tiles held in memory.
    pub max_tiles: usize,
}

/// Parser thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Gap between delimited-text rows that starts a new flight.
    pub csv_split_gap_secs: u64,
    /// Gap between GPX points that starts a new flight.
    pub gpx_split_gap_secs: u64,
    /// Shortest GPX segment kept, in samples.
    pub gpx_min_samples: usize,
    /// Shortest JSON recording accepted.
    pub json_min_duration_secs: u64,
}

/// Airframe aliasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirframeConfig {
    /// Fleet-specific raw name to canonical name.
    pub fleet_aliases: HashMap<String, String>,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/flightdata/flights.db`
    pub database_path: Option<PathBuf>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            csv_split_gap_secs: 5 * 60,
            gpx_split_gap_secs: 60,
            gpx_min_samples: 60,
            json_min_duration_secs: 3 * 60,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("FLIGHTDATA_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.terrain.max_tiles == 0 {
            return Err(Error::ConfigValidation {
                message: "terrain.max_tiles must be greater than 0".to_string(),
            });
        }

        if self.parsing.csv_split_gap_secs == 0 || self.parsing.gpx_split_gap_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "split gaps must be greater than 0".to_string(),
            });
        }

        if let Some((raw, _)) = self
            .airframes
            .fleet_aliases
            .iter()
            .find(|(_, canonical)| canonical.trim().is_empty())
        {
            return Err(Error::ConfigValidation {
                message: format!("fleet alias for '{raw}' is empty"),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Number of files processed at once.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        resolve_workers(self.pipeline.parallelism)
    }

    /// Number of steps computed at once.
    #[must_use]
    pub fn step_parallelism(&self) -> usize {
        resolve_workers(self.pipeline.step_parallelism)
    }

    /// Delimited-text split gap as a Duration.
    #[must_use]
    pub fn csv_split_gap(&self) -> Duration {
        Duration::from_secs(self.parsing.csv_split_gap_secs)
    }

    /// GPX split gap as a Duration.
    #[must_use]
    pub fn gpx_split_gap(&self) -> Duration {
        Duration::from_secs(self.parsing.gpx_split_gap_secs)
    }

    /// Shortest accepted JSON recording as a Duration.
    #[must_use]
    pub fn json_min_duration(&self) -> Duration {
        Duration::from_secs(self.parsing.json_min_duration_secs)
    }
}

fn resolve_workers(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}
