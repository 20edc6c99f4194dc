//! Error taxonomy for the federated fraud pipeline.
//!
//! Schema and emptiness failures are fatal to the current operation and must
//! surface to the caller; they are never downgraded to a default score. A
//! single-class partition is not an error at all; see
//! [`crate::models::trainer::FitOutcome::Skipped`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("feature matrix schema mismatch: expected {expected} columns, got {found}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("all rows dropped during timestamp parsing")]
    EmptyInput,

    #[error("cannot aggregate an ensemble with zero eligible models")]
    EmptyEnsemble,

    #[error("ensemble members and weights differ in length: {members} models, {weights} weights")]
    MemberWeightMismatch { members: usize, weights: usize },

    #[error("invalid aggregation weight: {0}")]
    InvalidWeight(f64),

    #[error("parallel inputs differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("artifact bundle invalid: {0}")]
    Artifact(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
