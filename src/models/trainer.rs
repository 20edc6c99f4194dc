//! Per-partition training: one classifier per state's data slice.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::metrics::binary_f1;
use crate::models::forest::{ForestParams, RandomForest};

/// Trainer settings: the subsample cap bounds grid-search cost on oversized
/// partitions, and the grids define the hyperparameter search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub subsample_cap: usize,
    pub depth_grid: Vec<u32>,
    pub trees_grid: Vec<usize>,
    pub min_leaf: usize,
    /// Cross-validation fold count for grid scoring.
    pub folds: usize,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            subsample_cap: 10_000,
            depth_grid: vec![5, 10, 15],
            trees_grid: vec![50, 100],
            min_leaf: 2,
            folds: 3,
            seed: 42,
        }
    }
}

/// A fitted classifier scoped to one partition, tagged with its aggregation
/// weight (the partition's full sample count) and training round. Immutable
/// once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionModel {
    pub partition_id: String,
    pub sample_count: usize,
    pub round: u32,
    pub forest: RandomForest,
}

/// Result of one partition's training call.
///
/// A partition with a single label value is a signaled no-op, not a failure:
/// it keeps its sample count but contributes no model (and therefore zero
/// weight) to the round.
#[derive(Debug, Clone)]
pub enum FitOutcome {
    Trained(PartitionModel),
    Skipped {
        partition_id: String,
        sample_count: usize,
    },
}

impl FitOutcome {
    pub fn sample_count(&self) -> usize {
        match self {
            Self::Trained(model) => model.sample_count,
            Self::Skipped { sample_count, .. } => *sample_count,
        }
    }

    pub fn partition_id(&self) -> &str {
        match self {
            Self::Trained(model) => &model.partition_id,
            Self::Skipped { partition_id, .. } => partition_id,
        }
    }
}

/// Fits one classifier per partition with a deterministic grid search.
#[derive(Debug, Clone)]
pub struct PartitionTrainer {
    config: TrainerConfig,
}

impl PartitionTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Train a classifier for one partition.
    ///
    /// Oversized partitions are subsampled to the configured cap before the
    /// grid search, and the winning configuration is refitted on that same
    /// subsample, never on the full partition. The reported `sample_count`
    /// is always the full partition size, since it is the aggregation
    /// weight.
    pub fn fit(&self, partition_id: &str, x: &[Vec<f64>], y: &[u8], round: u32) -> FitOutcome {
        let sample_count = y.len();

        let has_both_classes = y.iter().any(|&l| l == 0) && y.iter().any(|&l| l == 1);
        if !has_both_classes {
            info!(
                partition = partition_id,
                sample_count, "single class present, skipping fit"
            );
            return FitOutcome::Skipped {
                partition_id: partition_id.to_string(),
                sample_count,
            };
        }

        let seed = partition_seed(self.config.seed, partition_id);
        let (x_sub, y_sub) = self.subsample(x, y, seed);

        let params = self.grid_search(&x_sub, &y_sub, seed, partition_id);
        let forest = RandomForest::fit(&x_sub, &y_sub, params);

        FitOutcome::Trained(PartitionModel {
            partition_id: partition_id.to_string(),
            sample_count,
            round,
            forest,
        })
    }

    fn subsample(&self, x: &[Vec<f64>], y: &[u8], seed: u64) -> (Vec<Vec<f64>>, Vec<u8>) {
        if x.len() <= self.config.subsample_cap {
            return (x.to_vec(), y.to_vec());
        }

        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..x.len()).collect();
        for i in 0..self.config.subsample_cap {
            let j = rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
        indices.truncate(self.config.subsample_cap);

        let x_sub = indices.iter().map(|&i| x[i].clone()).collect();
        let y_sub = indices.iter().map(|&i| y[i]).collect();
        (x_sub, y_sub)
    }

    /// Exhaustive grid search scored by mean F1 over held-out folds. Grid
    /// order is fixed and ties keep the earlier combination, so the choice
    /// is deterministic for a fixed seed.
    fn grid_search(&self, x: &[Vec<f64>], y: &[u8], seed: u64, partition_id: &str) -> ForestParams {
        let folds = fold_assignments(x.len(), self.config.folds.max(2), seed);

        let mut best_score = f64::NEG_INFINITY;
        let mut best = ForestParams {
            max_depth: self.config.depth_grid.first().copied().unwrap_or(10),
            n_trees: self.config.trees_grid.first().copied().unwrap_or(100),
            min_leaf: self.config.min_leaf,
            seed,
        };

        for &max_depth in &self.config.depth_grid {
            for &n_trees in &self.config.trees_grid {
                let params = ForestParams {
                    n_trees,
                    max_depth,
                    min_leaf: self.config.min_leaf,
                    seed,
                };
                let score = self.cross_validate(x, y, &folds, &params);
                debug!(
                    partition = partition_id,
                    max_depth, n_trees, score, "grid point scored"
                );
                if score > best_score {
                    best_score = score;
                    best = params;
                }
            }
        }

        info!(
            partition = partition_id,
            max_depth = best.max_depth,
            n_trees = best.n_trees,
            f1 = best_score,
            "grid search complete"
        );
        best
    }

    fn cross_validate(
        &self,
        x: &[Vec<f64>],
        y: &[u8],
        folds: &[usize],
        params: &ForestParams,
    ) -> f64 {
        let n_folds = folds.iter().max().map_or(0, |m| m + 1);
        let mut total = 0.0;
        for fold in 0..n_folds {
            let mut x_train = Vec::new();
            let mut y_train = Vec::new();
            let mut x_test = Vec::new();
            let mut y_test = Vec::new();
            for (i, &assigned) in folds.iter().enumerate() {
                if assigned == fold {
                    x_test.push(x[i].clone());
                    y_test.push(y[i]);
                } else {
                    x_train.push(x[i].clone());
                    y_train.push(y[i]);
                }
            }
            if y_train.is_empty() || y_test.is_empty() {
                continue;
            }

            let forest = RandomForest::fit(&x_train, &y_train, params.clone());
            let predictions: Vec<bool> = x_test
                .iter()
                .map(|row| forest.predict_proba_one(row)[1] >= 0.5)
                .collect();
            total += binary_f1(&y_test, &predictions);
        }
        total / n_folds.max(1) as f64
    }
}

/// Shuffled fold assignment, one fold index per sample.
fn fold_assignments(n: usize, folds: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = Pcg64Mcg::seed_from_u64(seed ^ 0x5851_f42d_4c95_7f2d);
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }

    let mut assignment = vec![0; n];
    for (rank, &i) in order.iter().enumerate() {
        assignment[i] = rank % folds;
    }
    assignment
}

/// Stable per-partition seed stream derived from the master seed.
fn partition_seed(seed: u64, partition_id: &str) -> u64 {
    partition_id.bytes().fold(seed, |acc, b| {
        acc.rotate_left(5) ^ u64::from(b).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    })
}
