//! Configuration for the offline training pipeline.

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::trainer::TrainerConfig;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
}

/// Input and output locations.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Raw labeled training CSV.
    pub train_csv: String,
    /// Optional held-out labeled CSV for threshold selection and reporting.
    #[serde(default)]
    pub eval_csv: Option<String>,
    /// Directory for per-round partition models.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Output path for the deployable artifact bundle.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
}

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_artifact_path() -> String {
    "models/global_ensemble.json".to_string()
}

/// Training hyperparameters. Everything is seeded so a rerun reproduces the
/// same artifact bit-for-bit.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_subsample_cap")]
    pub subsample_cap: usize,
    #[serde(default = "default_depth_grid")]
    pub depth_grid: Vec<u32>,
    #[serde(default = "default_trees_grid")]
    pub trees_grid: Vec<usize>,
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_min_leaf")]
    pub min_leaf: usize,
    /// Target-encoder smoothing strength.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

fn default_rounds() -> u32 {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_subsample_cap() -> usize {
    10_000
}

fn default_depth_grid() -> Vec<u32> {
    vec![5, 10, 15]
}

fn default_trees_grid() -> Vec<usize> {
    vec![50, 100]
}

fn default_folds() -> usize {
    3
}

fn default_min_leaf() -> usize {
    2
}

fn default_smoothing() -> f64 {
    20.0
}

impl TrainingConfig {
    /// The per-partition trainer settings this configuration implies.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            subsample_cap: self.subsample_cap,
            depth_grid: self.depth_grid.clone(),
            trees_grid: self.trees_grid.clone(),
            min_leaf: self.min_leaf,
            folds: self.folds,
            seed: self.seed,
        }
    }
}

/// Serving-side decision settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Threshold used when no held-out evaluation set is configured.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
}

fn default_fallback_threshold() -> f64 {
    0.5
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/pipeline.toml")
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                train_csv: "data/fraudTrain.csv".to_string(),
                eval_csv: None,
                models_dir: default_models_dir(),
                artifact_path: default_artifact_path(),
            },
            training: TrainingConfig {
                rounds: default_rounds(),
                seed: default_seed(),
                subsample_cap: default_subsample_cap(),
                depth_grid: default_depth_grid(),
                trees_grid: default_trees_grid(),
                folds: default_folds(),
                min_leaf: default_min_leaf(),
                smoothing: default_smoothing(),
            },
            detection: DetectionConfig {
                fallback_threshold: default_fallback_threshold(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
        }
    }
}
