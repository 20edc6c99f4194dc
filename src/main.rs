//! Federated Fraud Pipeline - Offline Training Driver
//!
//! Fits the feature builder on the raw training CSV, trains one classifier
//! per state partition across the configured rounds, aggregates the final
//! round into the global weighted ensemble, selects the operating threshold
//! on the held-out set, and persists the deployable artifact bundle.

use anyhow::{Context, Result};
use federated_fraud_pipeline::{
    artifact::{self, ArtifactBundle},
    config::AppConfig,
    dataset::{self, LabeledSet},
    features::{FeatureBuilder, RateTable},
    federation::{run_round, PartitionClient},
    metrics::EvaluationReport,
    models::threshold::select_threshold,
    EnsembleModel,
};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/pipeline.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        AppConfig::load_from_path(&config_path)?
    } else {
        AppConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    info!("Starting federated fraud training pipeline");

    // Central fit: feature builder and rate tables come from the full corpus
    let records = dataset::read_transactions(&config.data.train_csv)
        .with_context(|| format!("failed to read {}", config.data.train_csv))?;
    let fit = FeatureBuilder::fit(&records, config.training.smoothing)?;
    info!(
        rows = fit.matrix.len(),
        columns = fit.builder.schema().len(),
        "feature builder fitted"
    );

    let merchant_rate = RateTable::fit(
        fit.kept_rows
            .iter()
            .map(|&i| records[i].merchant.as_deref()),
        &fit.labels,
    );

    let states: Vec<String> = fit
        .kept_rows
        .iter()
        .map(|&i| {
            records[i]
                .state
                .clone()
                .unwrap_or_else(|| "UNK".to_string())
        })
        .collect();
    let set = LabeledSet {
        x: fit.matrix,
        y: fit.labels,
        states,
    };

    // Rebalance centrally, then hand each state its slice
    let balanced = dataset::rebalance(&set, config.training.seed);
    let partitions = dataset::split_by_state(&balanced);

    let trainer_config = config.training.trainer_config();
    let mut clients: Vec<PartitionClient> = partitions
        .into_iter()
        .map(|(state, partition)| {
            PartitionClient::new(state, partition.x, partition.y, trainer_config.clone())
        })
        .collect();
    info!(partitions = clients.len(), "partition clients initialized");

    let models_dir = Path::new(&config.data.models_dir);
    let mut summary = None;
    for _ in 0..config.training.rounds {
        summary = Some(run_round(&mut clients, Some(models_dir))?);
    }
    let summary = summary.context("no training rounds configured")?;
    info!(
        round = summary.round,
        trained = summary.trained,
        skipped = summary.skipped,
        "final round complete"
    );

    // The persisted per-round models are the hand-off to aggregation: only
    // partitions that actually trained this round have a file to load.
    let members = artifact::load_partition_models(models_dir, summary.round)?;
    let ensemble = EnsembleModel::from_partition_models(members)?;

    // Threshold selection on the held-out set, when one is configured
    let threshold = match &config.data.eval_csv {
        Some(eval_csv) => {
            let eval_records = dataset::read_transactions(eval_csv)
                .with_context(|| format!("failed to read {eval_csv}"))?;
            let transformed = fit.builder.transform(&eval_records)?;

            let mut y_true = Vec::new();
            let mut y_prob = Vec::new();
            for (row, &i) in transformed.matrix.iter().zip(&transformed.kept_rows) {
                if let Some(label) = eval_records[i].is_fraud {
                    y_true.push(label);
                    y_prob.push(ensemble.predict_proba_one(row)[1]);
                }
            }

            let choice = select_threshold(&y_true, &y_prob)?;
            EvaluationReport::compute(&y_true, &y_prob, choice.threshold).log();
            choice.threshold
        }
        None => {
            warn!(
                threshold = config.detection.fallback_threshold,
                "no evaluation set configured, using fallback threshold"
            );
            config.detection.fallback_threshold
        }
    };

    let bundle = ArtifactBundle {
        merchant_rate: merchant_rate.rates().clone(),
        state_rate: fit.builder.state_rate().rates().clone(),
        global_rate: fit.builder.global_rate(),
        feature_builder: fit.builder,
        ensemble,
        threshold,
    };
    bundle.validate().context("assembled bundle failed validation")?;
    bundle.save(&config.data.artifact_path)?;

    info!(
        artifact = %config.data.artifact_path,
        threshold,
        "training pipeline complete"
    );
    Ok(())
}
