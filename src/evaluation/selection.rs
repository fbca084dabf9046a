//! Best-family selection and the final full-data refit

use crate::error::{CrashRiskError, Result};
use crate::evaluation::evaluator::EvaluationResult;
use crate::optimizer::search_space::TrialParams;
use crate::training::models::{Classifier, FittedModel};
use crate::training::registry::ModelRegistry;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The winning family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub family: String,
    pub features: Vec<String>,
    pub params: TrialParams,
    /// Held-out ROC-AUC of the uncalibrated model, or the negated Brier
    /// score when no family has a ROC-AUC
    pub score: f64,
    /// Whether `score` exceeds the performance floor. Always true when
    /// ranking by Brier, where the ROC-AUC floor does not apply.
    pub above_floor: bool,
}

/// Pick the family with the strictly highest held-out ROC-AUC.
///
/// The first evaluated family wins ties. When the target is not binary no
/// ROC-AUC exists and the lowest Brier score wins instead. A best ROC-AUC at
/// or below `perf_cutoff` is logged as a warning but still selected; the
/// floor is not checked on the Brier fallback.
pub fn select_best(results: &[EvaluationResult], perf_cutoff: f64) -> Result<Selection> {
    let by_auc = |r: &EvaluationResult| r.raw.metrics.roc_auc;
    let by_brier = |r: &EvaluationResult| Some(-r.raw.metrics.brier);
    let ranked_by_auc = results.iter().any(|r| by_auc(r).is_some());
    let key: &dyn Fn(&EvaluationResult) -> Option<f64> = if ranked_by_auc {
        &by_auc
    } else {
        &by_brier
    };

    let mut best: Option<(&EvaluationResult, f64)> = None;
    for result in results {
        if let Some(score) = key(result) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((result, score));
            }
        }
    }

    let (winner, score) = best.ok_or_else(|| {
        CrashRiskError::ValidationError("no evaluated model family to select from".to_string())
    })?;

    let above_floor = !ranked_by_auc || score > perf_cutoff;
    if above_floor {
        info!(family = %winner.family, score, by_auc = ranked_by_auc, "Selected model family");
    } else {
        warn!(
            family = %winner.family,
            score,
            perf_cutoff,
            "Best model does not exceed the performance floor"
        );
    }

    Ok(Selection {
        family: winner.family.clone(),
        features: winner.features.clone(),
        params: winner.params.clone(),
        score,
        above_floor,
    })
}

/// Fit the selected family once more on every labeled row
pub fn refit_full(
    registry: &ModelRegistry,
    selection: &Selection,
    x: &Array2<f64>,
    y: &Array1<f64>,
    seed: Option<u64>,
) -> Result<FittedModel> {
    let family = registry.get(&selection.family)?;
    let mut model = family.build(&selection.params, seed)?;
    model.fit(x, y)?;
    info!(family = family.name, rows = x.nrows(), "Refit selected model on full data");
    Ok(model)
}
