//! Held-out evaluation of a tuned model family
//!
//! The uncalibrated model is fitted on the whole training partition. The
//! calibrated model fits its base estimator on one half of the training
//! partition and its calibrator on the other, disjoint half.

use crate::calibration::{CalibratedModel, CalibrationMethod};
use crate::error::Result;
use crate::evaluation::metrics::MetricSet;
use crate::optimizer::search_space::TrialParams;
use crate::training::models::Classifier;
use crate::training::registry::ModelRegistry;
use crate::training::split::SplitData;
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Predictions, probabilities and metrics on the test partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub predictions: Vec<f64>,
    pub probabilities: Vec<f64>,
    pub metrics: MetricSet,
}

impl Outcome {
    fn new(y_test: &Array1<f64>, probabilities: Array1<f64>, predictions: Array1<f64>) -> Result<Self> {
        let metrics = MetricSet::compute(y_test, &probabilities, &predictions)?;
        Ok(Self {
            predictions: predictions.to_vec(),
            probabilities: probabilities.to_vec(),
            metrics,
        })
    }
}

/// Evaluation of one family, raw and optionally calibrated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub family: String,
    pub features: Vec<String>,
    pub params: TrialParams,
    pub raw: Outcome,
    pub calibrated: Option<Outcome>,
    pub calibration_method: Option<CalibrationMethod>,
}

/// Split `0..n` into two disjoint halves covering every index.
///
/// Rows are shuffled within each class before halving, so each half keeps
/// the class mix of the whole. Returns `(fit, calibration)`.
pub fn disjoint_halves(y: &Array1<f64>, seed: Option<u64>) -> (Vec<usize>, Vec<usize>) {
    let mut rng = match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let (mut positives, mut negatives): (Vec<usize>, Vec<usize>) =
        (0..y.len()).partition(|&i| y[i] > 0.5);
    positives.shuffle(&mut rng);
    negatives.shuffle(&mut rng);

    let mut fit = Vec::with_capacity(y.len() / 2 + 1);
    let mut cal = Vec::with_capacity(y.len() / 2 + 1);
    for class in [positives, negatives] {
        let half = class.len() / 2;
        fit.extend_from_slice(&class[..half]);
        cal.extend_from_slice(&class[half..]);
    }
    fit.sort_unstable();
    cal.sort_unstable();
    (fit, cal)
}

/// Fits tuned families and scores them on the test partition
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: ModelRegistry,
    random_state: Option<u64>,
}

impl Evaluator {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            random_state: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Evaluate `family_name` with `params` on matrices already restricted
    /// to `features`. `calibrate` adds a calibrated outcome.
    pub fn evaluate(
        &self,
        family_name: &str,
        params: &TrialParams,
        features: &[String],
        data: &SplitData,
        calibrate: Option<CalibrationMethod>,
    ) -> Result<EvaluationResult> {
        let family = self.registry.get(family_name)?;

        let mut model = family.build(params, self.random_state)?;
        model.fit(&data.train_x, &data.train_y)?;
        let raw = Outcome::new(
            &data.test_y,
            model.predict_probability(&data.test_x)?,
            model.predict_label(&data.test_x)?,
        )?;

        let calibrated = match calibrate {
            Some(method) => {
                let (fit_idx, cal_idx) = disjoint_halves(&data.train_y, self.random_state);
                let (x_fit, y_fit) = rows(&data.train_x, &data.train_y, &fit_idx);
                let (x_cal, y_cal) = rows(&data.train_x, &data.train_y, &cal_idx);

                let mut base = family.build(params, self.random_state)?;
                base.fit(&x_fit, &y_fit)?;
                let calibrated = CalibratedModel::fit(base, method, &x_cal, &y_cal)?;
                Some(Outcome::new(
                    &data.test_y,
                    calibrated.predict_probability(&data.test_x)?,
                    calibrated.predict_label(&data.test_x)?,
                )?)
            }
            None => None,
        };

        info!(
            family = family.name,
            roc_auc = ?raw.metrics.roc_auc,
            brier = raw.metrics.brier,
            calibrated_roc_auc = ?calibrated.as_ref().and_then(|c| c.metrics.roc_auc),
            "Evaluated model family"
        );

        Ok(EvaluationResult {
            family: family.name.to_string(),
            features: features.to_vec(),
            params: params.clone(),
            raw,
            calibrated,
            calibration_method: calibrate,
        })
    }
}

fn rows(x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}
