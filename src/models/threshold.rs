//! Operating-threshold selection from a labeled evaluation set.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{f1_score, precision_recall_curve};

/// The chosen decision threshold and the curve point it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChoice {
    pub threshold: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Pick the threshold maximizing F1 over the precision-recall curve.
///
/// Ties resolve to the first occurrence in threshold-ascending order, which
/// is the curve's natural ordering, so repeated calls on the same input
/// return the identical threshold.
pub fn select_threshold(y_true: &[u8], y_prob: &[f64]) -> PipelineResult<ThresholdChoice> {
    if y_true.len() != y_prob.len() {
        return Err(PipelineError::LengthMismatch {
            left: y_true.len(),
            right: y_prob.len(),
        });
    }
    if y_true.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let curve = precision_recall_curve(y_true, y_prob);

    let mut choice: Option<ThresholdChoice> = None;
    for i in 0..curve.thresholds.len() {
        let f1 = f1_score(curve.precision[i], curve.recall[i]);
        if choice.as_ref().map_or(true, |c| f1 > c.f1) {
            choice = Some(ThresholdChoice {
                threshold: curve.thresholds[i],
                f1,
                precision: curve.precision[i],
                recall: curve.recall[i],
            });
        }
    }

    let choice = choice.ok_or(PipelineError::EmptyInput)?;
    info!(
        threshold = choice.threshold,
        f1 = choice.f1,
        "operating threshold selected"
    );
    Ok(choice)
}
