//! Inference module
//!
//! Provides the persisted scoring model and the prediction path:
//! - Scoring model artifact (fitted model + required feature order)
//! - Predict-time enrichment (null pruning, clock stamping, recent crash counts)
//! - Feature reconciliation and scoring

pub mod artifact;
pub mod engine;
pub mod enrich;

pub use artifact::ScoringModelArtifact;
pub use engine::{reconcile, write_predictions, ScoringEngine, PREDICTION_COLUMN};
pub use enrich::{
    attach_recent_crash_counts, crash_window_column, drop_sparse_columns, fill_nulls, stamp_clock,
    CRASH_WINDOWS, DEFAULT_NULL_THRESHOLD,
};
