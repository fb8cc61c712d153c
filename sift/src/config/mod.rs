//! Configuration management for sift
//!
//! The CLI reads the file named by `--config` (or `SIFT_CONFIG`).

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregations::bucket::{SignificanceAlgorithm, DEFAULT_GEOHASH_PRECISION, DEFAULT_SIZE};
use crate::aggregations::sketch::DEFAULT_PRECISION;
use crate::encoding::DistanceUnit;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub aggregations: AggregationDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aggregations: AggregationDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Values used when an aggregation request leaves a setting out.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationDefaults {
    #[serde(default = "default_size")]
    pub terms_size: usize,
    #[serde(default = "default_cardinality_precision")]
    pub cardinality_precision: u8,
    #[serde(default = "default_geohash_precision")]
    pub geohash_precision: usize,
    #[serde(default = "default_size")]
    pub geohash_size: usize,
    #[serde(default = "default_size")]
    pub significant_terms_size: usize,
    /// jlh, mutual_information, chi_squared or percentage
    #[serde(default = "default_significance_algorithm")]
    pub significance_algorithm: String,
    #[serde(default = "default_distance_unit")]
    pub distance_unit: String,
    #[serde(default)]
    pub histogram_min_doc_count: i64,
}

fn default_size() -> usize {
    DEFAULT_SIZE
}

fn default_cardinality_precision() -> u8 {
    DEFAULT_PRECISION
}

fn default_geohash_precision() -> usize {
    DEFAULT_GEOHASH_PRECISION
}

fn default_significance_algorithm() -> String {
    SignificanceAlgorithm::default().as_str().to_string()
}

fn default_distance_unit() -> String {
    DistanceUnit::default().as_str().to_string()
}

impl Default for AggregationDefaults {
    fn default() -> Self {
        Self {
            terms_size: default_size(),
            cardinality_precision: default_cardinality_precision(),
            geohash_precision: default_geohash_precision(),
            geohash_size: default_size(),
            significant_terms_size: default_size(),
            significance_algorithm: default_significance_algorithm(),
            distance_unit: default_distance_unit(),
            histogram_min_doc_count: 0,
        }
    }
}

impl AggregationDefaults {
    /// Reject names the request layer could not resolve.
    pub fn validate(&self) -> Result<()> {
        if SignificanceAlgorithm::parse(&self.significance_algorithm).is_none() {
            bail!(
                "Unknown significance algorithm '{}' in [aggregations]",
                self.significance_algorithm
            );
        }
        if DistanceUnit::parse(&self.distance_unit).is_none() {
            bail!("Unknown distance unit '{}' in [aggregations]", self.distance_unit);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter string; RUST_LOG overrides it
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.expand_paths()?;
            config.aggregations.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = config.save(config_path) {
                tracing::debug!("Could not write default config to {:?}: {}", config_path, e);
            }
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        Ok(())
    }
}
