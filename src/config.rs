//! Configuration management

use crate::error::Result;
use crate::ml::RandomForestConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `STOCK_PREDICTOR__DASHBOARD__PORT=9000`
pub const ENV_PREFIX: &str = "STOCK_PREDICTOR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub model: ModelDefaults,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one `<SYMBOL>.csv` per stock
    #[serde(default = "default_data_dir")]
    pub dir: String,
    /// Column being predicted
    #[serde(default = "default_target")]
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fraction of rows held out for testing (taken from the end of the table)
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Features used when the caller selects none
    #[serde(default = "default_features")]
    pub default_features: Vec<String>,
    /// Rows shown in the table preview
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

/// Default random forest hyperparameters, seeded from [`RandomForestConfig::default`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefaults {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_data_dir() -> String {
    "stocks".to_string()
}

fn default_target() -> String {
    "Close_forcast".to_string()
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_features() -> Vec<String> {
    vec!["EMA50".to_string()]
}

fn default_preview_rows() -> usize {
    5
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8050
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            target: default_target(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            default_features: default_features(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl From<RandomForestConfig> for ModelDefaults {
    fn from(config: RandomForestConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            seed: config.seed,
        }
    }
}

impl Default for ModelDefaults {
    fn default() -> Self {
        RandomForestConfig::default().into()
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, overlaid by environment variables
    pub fn load(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pipeline.default_features")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        tracing::debug!(path, data_dir = %config.data.dir, "Configuration loaded");
        Ok(config)
    }
}

impl DataConfig {
    /// Data directory with `~` and environment variables expanded
    pub fn resolved_dir(&self) -> PathBuf {
        match shellexpand::full(&self.dir) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!("Could not expand data dir '{}': {}", self.dir, e);
                PathBuf::from(&self.dir)
            }
        }
    }
}
