//! Core data types shared across the pipeline.

pub mod score;
pub mod transaction;

pub use score::ScoreOutcome;
pub use transaction::RawTransaction;
