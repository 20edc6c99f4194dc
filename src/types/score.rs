//! Scoring results handed back to the serving collaborator.

use serde::{Deserialize, Serialize};

/// Outcome of scoring a single transaction: the thresholded binary label
/// plus the raw ensemble fraud probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// True when `score >= threshold`.
    pub is_fraud: bool,

    /// Weighted-ensemble fraud probability in [0, 1].
    pub score: f64,
}

impl ScoreOutcome {
    /// Apply a decision threshold to a raw probability.
    pub fn from_probability(score: f64, threshold: f64) -> Self {
        Self {
            is_fraud: score >= threshold,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_application() {
        let hit = ScoreOutcome::from_probability(0.7, 0.42);
        assert!(hit.is_fraud);

        let miss = ScoreOutcome::from_probability(0.3, 0.42);
        assert!(!miss.is_fraud);
        assert_eq!(miss.score, 0.3);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert!(ScoreOutcome::from_probability(0.42, 0.42).is_fraud);
    }
}
