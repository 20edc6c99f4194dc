//! Weighted ensemble aggregation of per-partition classifiers.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::models::forest::RandomForest;
use crate::models::trainer::PartitionModel;

/// The deployable global classifier: an ordered list of member forests and
/// a parallel list of normalized weights.
///
/// Order correspondence between `members` and `weights` is an invariant;
/// both are private and only constructed together through [`aggregate`].
/// Aggregation is pure: no retraining or calibration happens here, so
/// serving cost stays at N members × one inference each.
///
/// [`aggregate`]: EnsembleModel::aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleModel {
    members: Vec<RandomForest>,
    weights: Vec<f64>,
}

impl EnsembleModel {
    /// Combine fitted members under sample-count weights.
    ///
    /// Raw counts are normalized to sum to 1 here; callers pass plain
    /// sample counts. Zero members, zero total weight, a member/count
    /// length mismatch, or a negative or non-finite count all fail fast.
    pub fn aggregate(members: Vec<RandomForest>, counts: &[f64]) -> PipelineResult<Self> {
        if members.is_empty() {
            return Err(PipelineError::EmptyEnsemble);
        }
        if members.len() != counts.len() {
            return Err(PipelineError::MemberWeightMismatch {
                members: members.len(),
                weights: counts.len(),
            });
        }
        for &count in counts {
            if !count.is_finite() || count < 0.0 {
                return Err(PipelineError::InvalidWeight(count));
            }
        }

        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return Err(PipelineError::EmptyEnsemble);
        }
        let weights: Vec<f64> = counts.iter().map(|c| c / total).collect();

        info!(members = members.len(), "ensemble aggregated");
        Ok(Self { members, weights })
    }

    /// Combine trained partition models, weighted by their sample counts.
    /// Skipped partitions never appear here; they carry no model.
    pub fn from_partition_models(models: Vec<PartitionModel>) -> PipelineResult<Self> {
        let counts: Vec<f64> = models.iter().map(|m| m.sample_count as f64).collect();
        let members = models.into_iter().map(|m| m.forest).collect();
        Self::aggregate(members, &counts)
    }

    /// Weighted two-class probability row for one input: Σ wᵢ·memberᵢ(x).
    pub fn predict_proba_one(&self, row: &[f64]) -> [f64; 2] {
        let mut out = [0.0, 0.0];
        for (member, &weight) in self.members.iter().zip(&self.weights) {
            let p = member.predict_proba_one(row);
            out[0] += weight * p[0];
            out[1] += weight * p[1];
        }
        out
    }

    /// Weighted probability rows for a matrix.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<[f64; 2]> {
        x.iter().map(|row| self.predict_proba_one(row)).collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
