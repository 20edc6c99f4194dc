//! Offline evaluation metrics for the ensemble.
//!
//! Consumed by the threshold selector and by the evaluation collaborator's
//! reporting. All functions are pure and deterministic for fixed input.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Stabilizes F1 denominators when precision + recall is zero.
pub const F1_EPSILON: f64 = 1e-9;

/// Precision-recall curve over every distinct predicted score.
///
/// `thresholds` is ascending; `precision[i]` and `recall[i]` are computed by
/// labeling positive every sample with `score >= thresholds[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Compute the precision-recall curve for binary labels and scores.
pub fn precision_recall_curve(y_true: &[u8], y_prob: &[f64]) -> PrCurve {
    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| {
        y_prob[a]
            .partial_cmp(&y_prob[b])
            .expect("non-finite probability")
    });

    let total_pos: u64 = y_true.iter().map(|&y| u64::from(y)).sum();

    // positives among samples at or after each sorted position
    let n = order.len();
    let mut pos_suffix = vec![0u64; n + 1];
    for i in (0..n).rev() {
        pos_suffix[i] = pos_suffix[i + 1] + u64::from(y_true[order[i]]);
    }

    let mut curve = PrCurve {
        precision: Vec::new(),
        recall: Vec::new(),
        thresholds: Vec::new(),
    };
    for i in 0..n {
        // one curve point per distinct score, at its first sorted occurrence
        if i > 0 && y_prob[order[i]] == y_prob[order[i - 1]] {
            continue;
        }
        let predicted_pos = (n - i) as f64;
        let tp = pos_suffix[i] as f64;
        curve.thresholds.push(y_prob[order[i]]);
        curve.precision.push(tp / predicted_pos);
        curve.recall.push(if total_pos > 0 {
            tp / total_pos as f64
        } else {
            0.0
        });
    }
    curve
}

/// F1 with a stabilized denominator.
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + F1_EPSILON)
}

/// F1 of hard predictions against binary labels.
pub fn binary_f1(y_true: &[u8], y_pred: &[bool]) -> f64 {
    let mut tp = 0u64;
    let mut fp = 0u64;
    let mut fneg = 0u64;
    for (&y, &pred) in y_true.iter().zip(y_pred) {
        match (y, pred) {
            (1, true) => tp += 1,
            (0, true) => fp += 1,
            (1, false) => fneg += 1,
            _ => {}
        }
    }
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fneg > 0 {
        tp as f64 / (tp + fneg) as f64
    } else {
        0.0
    };
    f1_score(precision, recall)
}

/// Binary cross-entropy of probability predictions, with clamping so a
/// confidently wrong model scores finitely.
pub fn log_loss(y_true: &[u8], y_prob: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for (&y, &p) in y_true.iter().zip(y_prob) {
        let p = p.clamp(1e-15, 1.0 - 1e-15);
        total -= if y == 1 { p.ln() } else { (1.0 - p).ln() };
    }
    total / y_true.len() as f64
}

/// Held-out performance at a fixed decision threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub threshold: f64,
}

impl EvaluationReport {
    pub fn compute(y_true: &[u8], y_prob: &[f64], threshold: f64) -> Self {
        let mut tp = 0u64;
        let mut fp = 0u64;
        let mut tn = 0u64;
        let mut fneg = 0u64;
        for (&y, &p) in y_true.iter().zip(y_prob) {
            match (y, p >= threshold) {
                (1, true) => tp += 1,
                (0, true) => fp += 1,
                (0, false) => tn += 1,
                _ => fneg += 1,
            }
        }

        let total = (tp + fp + tn + fneg).max(1) as f64;
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fneg > 0 {
            tp as f64 / (tp + fneg) as f64
        } else {
            0.0
        };

        Self {
            accuracy: (tp + tn) as f64 / total,
            precision,
            recall,
            f1: f1_score(precision, recall),
            threshold,
        }
    }

    /// Log the report for the evaluation collaborator.
    pub fn log(&self) {
        info!(
            accuracy = self.accuracy,
            precision = self.precision,
            recall = self.recall,
            f1 = self.f1,
            threshold = self.threshold,
            "held-out evaluation"
        );
    }
}
