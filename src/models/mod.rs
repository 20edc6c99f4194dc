//! Model training, aggregation, threshold selection, and inference.

pub mod aggregator;
pub mod forest;
pub mod inference;
pub mod threshold;
pub mod trainer;

pub use aggregator::EnsembleModel;
pub use forest::{ForestParams, RandomForest};
pub use inference::InferenceEngine;
pub use threshold::{select_threshold, ThresholdChoice};
pub use trainer::{FitOutcome, PartitionModel, PartitionTrainer, TrainerConfig};
