//! Federated Fraud Pipeline Library
//!
//! The core of a federated credit-card fraud detection system: a centrally
//! fitted feature builder, independent per-state classifier training, a
//! sample-count-weighted ensemble, offline threshold selection, and an
//! inference path that reconciles raw serving input against the fitted
//! feature schema before scoring.

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod federation;
pub mod metrics;
pub mod models;
pub mod types;

pub use artifact::ArtifactBundle;
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use features::FeatureBuilder;
pub use federation::PartitionClient;
pub use models::aggregator::EnsembleModel;
pub use models::inference::InferenceEngine;
pub use models::threshold::select_threshold;
pub use models::trainer::{FitOutcome, PartitionTrainer};
pub use types::{RawTransaction, ScoreOutcome};
