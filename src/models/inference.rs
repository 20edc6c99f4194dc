//! Request-time scoring against the frozen artifact bundle.

use std::path::Path;

use tracing::debug;

use crate::artifact::ArtifactBundle;
use crate::error::PipelineResult;
use crate::types::{RawTransaction, ScoreOutcome};

/// Scores raw transactions with the loaded bundle.
///
/// The engine is constructed once at startup and shared by reference across
/// concurrent requests: nothing in it mutates after load, and re-fitting any
/// frozen encoder during serving would be a correctness bug, so no interior
/// mutability exists anywhere in the bundle.
pub struct InferenceEngine {
    bundle: ArtifactBundle,
}

impl InferenceEngine {
    pub fn new(bundle: ArtifactBundle) -> Self {
        Self { bundle }
    }

    /// Load and validate a persisted bundle.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        Ok(Self::new(ArtifactBundle::load(path)?))
    }

    /// Score one raw transaction.
    ///
    /// The record goes through the frozen feature builder's transform path
    /// (state risk lookup, merchant target encoding, then column
    /// reconciliation against the fitted schema) before the ensemble runs.
    /// A record that cannot be reconciled (or whose dates cannot be parsed)
    /// is rejected with an error; a wrong score is never returned silently.
    pub fn score(&self, txn: &RawTransaction) -> PipelineResult<ScoreOutcome> {
        let transformed = self
            .bundle
            .feature_builder
            .transform(std::slice::from_ref(txn))?;
        let probability = self.bundle.ensemble.predict_proba_one(&transformed.matrix[0])[1];
        let outcome = ScoreOutcome::from_probability(probability, self.bundle.threshold);

        debug!(
            score = outcome.score,
            is_fraud = outcome.is_fraud,
            "transaction scored"
        );
        Ok(outcome)
    }

    /// Fraud probabilities for a batch, with the surviving row indices.
    /// Used by offline evaluation; serving scores one record at a time.
    pub fn score_probabilities(
        &self,
        records: &[RawTransaction],
    ) -> PipelineResult<(Vec<f64>, Vec<usize>)> {
        let transformed = self.bundle.feature_builder.transform(records)?;
        let probs = transformed
            .matrix
            .iter()
            .map(|row| self.bundle.ensemble.predict_proba_one(row)[1])
            .collect();
        Ok((probs, transformed.kept_rows))
    }

    pub fn threshold(&self) -> f64 {
        self.bundle.threshold
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBuilder;
    use crate::models::aggregator::EnsembleModel;
    use crate::models::forest::RandomForest;
    use std::collections::BTreeMap;

    fn txn(state: &str, merchant: &str, category: Option<&str>, fraud: u8) -> RawTransaction {
        let mut t = RawTransaction::new("01/02/20 13:45", "1/5/80");
        t.state = Some(state.to_string());
        t.merchant = Some(merchant.to_string());
        t.category = category.map(str::to_string);
        t.gender = Some("F".to_string());
        t.amt = Some(25.0);
        t.lat = Some(40.0);
        t.long = Some(-74.0);
        t.merch_lat = Some(40.5);
        t.merch_long = Some(-74.5);
        t.city_pop = Some(10_000.0);
        t.is_fraud = Some(fraud);
        t
    }

    fn engine() -> InferenceEngine {
        let records = vec![
            txn("NY", "m_a", Some("food"), 0),
            txn("NY", "m_b", Some("travel"), 1),
            txn("CA", "m_a", Some("food"), 0),
            txn("CA", "m_c", Some("misc"), 1),
        ];
        let fit = FeatureBuilder::fit(&records, 20.0).unwrap();
        let ensemble =
            EnsembleModel::aggregate(vec![RandomForest::constant(0.7)], &[100.0]).unwrap();
        InferenceEngine::new(ArtifactBundle {
            merchant_rate: BTreeMap::new(),
            state_rate: fit.builder.state_rate().rates().clone(),
            global_rate: fit.builder.global_rate(),
            feature_builder: fit.builder,
            ensemble,
            threshold: 0.5,
        })
    }

    #[test]
    fn test_score_applies_threshold() {
        let engine = engine();
        let outcome = engine.score(&txn("NY", "m_a", Some("food"), 0)).unwrap();

        assert_eq!(outcome.score, 0.7);
        assert!(outcome.is_fraud);
    }

    #[test]
    fn test_unseen_state_and_merchant_still_score() {
        let engine = engine();
        let outcome = engine
            .score(&txn("ZZ", "brand_new_merchant", Some("gambling"), 0))
            .unwrap();
        assert!(outcome.score.is_finite());
    }

    #[test]
    fn test_missing_category_still_scores() {
        let engine = engine();
        let outcome = engine.score(&txn("NY", "m_a", None, 0)).unwrap();
        assert!((0.0..=1.0).contains(&outcome.score));
    }

    #[test]
    fn test_unparseable_record_is_rejected() {
        let engine = engine();
        let bad = RawTransaction::new("not a timestamp", "not a date");
        assert!(engine.score(&bad).is_err());
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let engine = engine();
        let record = txn("NY", "m_a", Some("food"), 0);

        let a = engine.score(&record).unwrap();
        let b = engine.score(&record).unwrap();
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a.is_fraud, b.is_fraud);
    }
}
