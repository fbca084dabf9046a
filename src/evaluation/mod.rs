//! Model evaluation module
//!
//! Held-out metrics, raw and calibrated evaluation of tuned families, and
//! selection of the best family.

pub mod evaluator;
pub mod metrics;
pub mod selection;

pub use evaluator::{disjoint_halves, EvaluationResult, Evaluator, Outcome};
pub use metrics::{accuracy, brier_score, f1_score, is_binary, roc_auc_score, Metric, MetricSet};
pub use selection::{refit_full, select_best, Selection};
