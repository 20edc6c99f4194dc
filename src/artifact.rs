//! Artifact persistence: the deployable bundle and per-round partition
//! models.
//!
//! The bundle is the sole hand-off between training and serving. It is an
//! explicit struct with every required field enumerated, validated eagerly
//! at load time so a broken artifact fails at startup instead of deep inside
//! a request.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::features::FeatureBuilder;
use crate::models::aggregator::EnsembleModel;
use crate::models::trainer::PartitionModel;

/// Everything serving needs, frozen at the end of training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    /// Fitted feature builder: encoders, imputation, scaling, schema.
    pub feature_builder: FeatureBuilder,
    /// Raw per-merchant fraud incidence from the training corpus.
    pub merchant_rate: BTreeMap<String, f64>,
    /// Raw per-state fraud incidence from the training corpus.
    pub state_rate: BTreeMap<String, f64>,
    /// Corpus-wide fraud rate; the fallback for unseen keys.
    pub global_rate: f64,
    /// The aggregated global classifier.
    pub ensemble: EnsembleModel,
    /// Operating decision threshold in [0, 1].
    pub threshold: f64,
}

impl ArtifactBundle {
    /// Serialize the bundle to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, self)?;
        info!(path = %path.display(), "artifact bundle saved");
        Ok(())
    }

    /// Load and validate a bundle. Any missing or inconsistent field is an
    /// error here, not later.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let bundle: Self = serde_json::from_reader(file)?;
        bundle.validate()?;
        info!(
            path = %path.display(),
            members = bundle.ensemble.len(),
            threshold = bundle.threshold,
            "artifact bundle loaded"
        );
        Ok(bundle)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.feature_builder.schema().is_empty() {
            return Err(PipelineError::Artifact("fitted schema is empty".into()));
        }
        if self.ensemble.is_empty() {
            return Err(PipelineError::Artifact("ensemble has no members".into()));
        }
        let weight_sum: f64 = self.ensemble.weights().iter().sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(PipelineError::Artifact(format!(
                "ensemble weights sum to {weight_sum}, expected 1"
            )));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::Artifact(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if !self.global_rate.is_finite() || !(0.0..=1.0).contains(&self.global_rate) {
            return Err(PipelineError::Artifact(format!(
                "global rate {} outside [0, 1]",
                self.global_rate
            )));
        }
        if self.global_rate != self.feature_builder.global_rate() {
            return Err(PipelineError::Artifact(
                "global rate disagrees with the fitted feature builder".into(),
            ));
        }
        Ok(())
    }
}

fn partition_model_filename(round: u32, partition_id: &str) -> String {
    format!("fed_round{round}_{partition_id}.json")
}

/// Persist one partition's trained model, tagged with round and partition.
pub fn save_partition_model(dir: impl AsRef<Path>, model: &PartitionModel) -> PipelineResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(partition_model_filename(model.round, &model.partition_id));
    let file = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(file, model)?;
    info!(partition = %model.partition_id, round = model.round, path = %path.display(), "partition model saved");
    Ok(path)
}

/// Load every persisted partition model for a round, sorted by filename so
/// the ensemble's member order is stable across runs.
pub fn load_partition_models(dir: impl AsRef<Path>, round: u32) -> PipelineResult<Vec<PartitionModel>> {
    let prefix = format!("fed_round{round}_");
    let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
        })
        .collect();
    paths.sort();

    let mut models = Vec::with_capacity(paths.len());
    for path in paths {
        let file = BufReader::new(File::open(&path)?);
        models.push(serde_json::from_reader(file)?);
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBuilder;
    use crate::models::forest::RandomForest;
    use crate::types::RawTransaction;

    fn sample_records() -> Vec<RawTransaction> {
        let mut a = RawTransaction::new("01/02/20 13:45", "1/5/80");
        a.state = Some("NY".into());
        a.merchant = Some("m_a".into());
        a.category = Some("food".into());
        a.amt = Some(10.0);
        a.is_fraud = Some(0);

        let mut b = a.clone();
        b.state = Some("CA".into());
        b.is_fraud = Some(1);
        vec![a, b]
    }

    fn sample_bundle() -> ArtifactBundle {
        let fit = FeatureBuilder::fit(&sample_records(), 20.0).unwrap();
        let ensemble =
            EnsembleModel::aggregate(vec![RandomForest::constant(0.5)], &[10.0]).unwrap();
        ArtifactBundle {
            merchant_rate: BTreeMap::new(),
            state_rate: fit.builder.state_rate().rates().clone(),
            global_rate: fit.builder.global_rate(),
            feature_builder: fit.builder,
            ensemble,
            threshold: 0.5,
        }
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");

        let bundle = sample_bundle();
        bundle.save(&path).unwrap();
        let loaded = ArtifactBundle::load(&path).unwrap();

        assert_eq!(loaded.threshold, bundle.threshold);
        assert_eq!(loaded.ensemble.len(), 1);
        assert_eq!(
            loaded.feature_builder.schema(),
            bundle.feature_builder.schema()
        );
    }

    #[test]
    fn test_invalid_threshold_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");

        let mut bundle = sample_bundle();
        bundle.threshold = 1.5;
        bundle.save(&path).unwrap();

        match ArtifactBundle::load(&path) {
            Err(PipelineError::Artifact(msg)) => assert!(msg.contains("threshold")),
            other => panic!("expected Artifact error, got {other:?}"),
        }
    }

    #[test]
    fn test_partition_model_round_trip_sorted() {
        let dir = tempfile::tempdir().unwrap();

        for (id, count) in [("NY", 100), ("CA", 300)] {
            let model = PartitionModel {
                partition_id: id.to_string(),
                sample_count: count,
                round: 3,
                forest: RandomForest::constant(0.5),
            };
            save_partition_model(dir.path(), &model).unwrap();
        }
        // a different round must not be picked up
        save_partition_model(
            dir.path(),
            &PartitionModel {
                partition_id: "TX".to_string(),
                sample_count: 50,
                round: 2,
                forest: RandomForest::constant(0.5),
            },
        )
        .unwrap();

        let models = load_partition_models(dir.path(), 3).unwrap();
        let ids: Vec<&str> = models.iter().map(|m| m.partition_id.as_str()).collect();
        assert_eq!(ids, ["CA", "NY"]);
    }
}
