//! Federated-round surface: the per-partition client callbacks the external
//! round coordinator drives, and a local runner for offline training.
//!
//! The coordinator itself (scheduling, transport) is an external black box;
//! it only ever calls [`PartitionClient::fit`] and
//! [`PartitionClient::evaluate`]. Both are synchronous: a round is complete
//! when every client's `fit` has returned.

use std::path::Path;

use tracing::info;

use crate::artifact::save_partition_model;
use crate::error::PipelineResult;
use crate::metrics::log_loss;
use crate::models::aggregator::EnsembleModel;
use crate::models::trainer::{FitOutcome, PartitionTrainer, TrainerConfig};

/// Local metrics a client reports from `evaluate`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEvaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub sample_count: usize,
}

/// One partition's training client: holds that partition's data and its
/// latest fitted model. No client ever reads another's state.
pub struct PartitionClient {
    partition_id: String,
    x: Vec<Vec<f64>>,
    y: Vec<u8>,
    trainer: PartitionTrainer,
    round: u32,
    latest: Option<FitOutcome>,
}

impl PartitionClient {
    pub fn new(
        partition_id: impl Into<String>,
        x: Vec<Vec<f64>>,
        y: Vec<u8>,
        config: TrainerConfig,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            x,
            y,
            trainer: PartitionTrainer::new(config),
            round: 0,
            latest: None,
        }
    }

    /// Train on the local partition for the next round. A trained model is
    /// persisted under `models_dir` when one is given; a single-class
    /// partition yields `Skipped` and persists nothing.
    pub fn fit(&mut self, models_dir: Option<&Path>) -> PipelineResult<FitOutcome> {
        self.round += 1;
        let outcome = self
            .trainer
            .fit(&self.partition_id, &self.x, &self.y, self.round);

        if let (FitOutcome::Trained(model), Some(dir)) = (&outcome, models_dir) {
            save_partition_model(dir, model)?;
        }

        self.latest = Some(outcome.clone());
        Ok(outcome)
    }

    /// Evaluate the latest fitted model on the local data. The coordinator
    /// may call this before the first fit (or after a skip); that reports
    /// zero accuracy rather than failing.
    pub fn evaluate(&self) -> LocalEvaluation {
        match &self.latest {
            Some(FitOutcome::Trained(model)) => {
                let probs: Vec<f64> = self
                    .x
                    .iter()
                    .map(|row| model.forest.predict_proba_one(row)[1])
                    .collect();
                let correct = probs
                    .iter()
                    .zip(&self.y)
                    .filter(|(p, label)| (**p >= 0.5) == (**label == 1))
                    .count();
                LocalEvaluation {
                    loss: log_loss(&self.y, &probs),
                    accuracy: correct as f64 / self.y.len().max(1) as f64,
                    sample_count: self.y.len(),
                }
            }
            _ => LocalEvaluation {
                loss: 0.0,
                accuracy: 0.0,
                sample_count: self.y.len(),
            },
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn sample_count(&self) -> usize {
        self.y.len()
    }
}

/// Outcome of one completed round.
pub struct RoundSummary {
    pub round: u32,
    pub trained: usize,
    pub skipped: usize,
    pub ensemble: EnsembleModel,
}

/// Drive one full round over every client and aggregate the survivors.
///
/// Clients run sequentially and independently. Partitions that skipped
/// contribute zero weight: they are excluded from the ensemble entirely
/// rather than included under a bogus class mapping.
pub fn run_round(
    clients: &mut [PartitionClient],
    models_dir: Option<&Path>,
) -> PipelineResult<RoundSummary> {
    let mut models = Vec::new();
    let mut skipped = 0usize;
    let mut round = 0;

    for client in clients.iter_mut() {
        let outcome = client.fit(models_dir)?;
        round = client.round();
        match outcome {
            FitOutcome::Trained(model) => models.push(model),
            FitOutcome::Skipped {
                partition_id,
                sample_count,
            } => {
                info!(partition = %partition_id, sample_count, "partition skipped this round");
                skipped += 1;
            }
        }
    }

    let trained = models.len();
    let ensemble = EnsembleModel::from_partition_models(models)?;
    info!(round, trained, skipped, "round complete");

    Ok(RoundSummary {
        round,
        trained,
        skipped,
        ensemble,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> TrainerConfig {
        TrainerConfig {
            depth_grid: vec![3],
            trees_grid: vec![5],
            folds: 2,
            ..TrainerConfig::default()
        }
    }

    fn two_class_data(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let side = (i % 2) as u8;
            x.push(vec![if side == 0 { -1.0 } else { 1.0 } + (i / 2) as f64 * 0.01]);
            y.push(side);
        }
        (x, y)
    }

    #[test]
    fn test_round_excludes_skipped_partitions() {
        let (x, y) = two_class_data(40);
        let mut clients = vec![
            PartitionClient::new("NY", x.clone(), y.clone(), fast_config()),
            PartitionClient::new("TX", vec![vec![0.0]; 4], vec![1, 1, 1, 1], fast_config()),
            PartitionClient::new("CA", x, y, fast_config()),
        ];

        let summary = run_round(&mut clients, None).unwrap();
        assert_eq!(summary.round, 1);
        assert_eq!(summary.trained, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ensemble.len(), 2);

        let sum: f64 = summary.ensemble.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_skipped_round_fails_fast() {
        let mut clients = vec![PartitionClient::new(
            "TX",
            vec![vec![0.0]; 4],
            vec![1, 1, 1, 1],
            fast_config(),
        )];
        assert!(run_round(&mut clients, None).is_err());
    }

    #[test]
    fn test_rounds_advance_per_client() {
        let (x, y) = two_class_data(20);
        let mut clients = vec![PartitionClient::new("NY", x, y, fast_config())];

        run_round(&mut clients, None).unwrap();
        let summary = run_round(&mut clients, None).unwrap();
        assert_eq!(summary.round, 2);
        assert_eq!(clients[0].round(), 2);
    }

    #[test]
    fn test_evaluate_before_fit_reports_zero() {
        let (x, y) = two_class_data(10);
        let client = PartitionClient::new("NY", x, y, fast_config());

        let eval = client.evaluate();
        assert_eq!(eval.accuracy, 0.0);
        assert_eq!(eval.sample_count, 10);
    }

    #[test]
    fn test_evaluate_after_fit() {
        let (x, y) = two_class_data(40);
        let mut client = PartitionClient::new("NY", x, y, fast_config());
        client.fit(None).unwrap();

        let eval = client.evaluate();
        assert!(eval.accuracy > 0.8);
        assert!(eval.loss.is_finite());
    }

    #[test]
    fn test_trained_models_are_persisted_per_round() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y) = two_class_data(20);
        let mut clients = vec![PartitionClient::new("NY", x, y, fast_config())];

        run_round(&mut clients, Some(dir.path())).unwrap();

        let saved = crate::artifact::load_partition_models(dir.path(), 1).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].partition_id, "NY");
        assert_eq!(saved[0].round, 1);
    }
}
