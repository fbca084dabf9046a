//! Linear support vector classifier
//!
//! Hinge-loss SVM solved by dual coordinate descent. The model has no
//! probability output; its decision value is exposed as the probability proxy.

use crate::error::{CrashRiskError, Result};
use crate::training::linear_models::ClassWeight;
use crate::training::models::{check_width, check_xy, Classifier, FeatureWeights};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Linear SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub class_weight: ClassWeight,
    /// Tolerance on the projected-gradient spread
    pub tol: f64,
    pub max_iter: usize,
    pub random_state: Option<u64>,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            class_weight: ClassWeight::Uniform,
            tol: 1e-3,
            max_iter: 1000,
            random_state: Some(42),
        }
    }
}

/// Linear support vector classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    config: SvmConfig,
    weights: Option<Array1<f64>>,
    bias: f64,
}

impl LinearSvm {
    pub fn new(config: SvmConfig) -> Self {
        Self {
            config,
            weights: None,
            bias: 0.0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if !(self.config.c > 0.0) {
            return Err(CrashRiskError::InvalidParameter {
                name: "c".to_string(),
                value: self.config.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let n = x.nrows();
        let d = x.ncols();
        let signs = y.mapv(|v| if v > 0.5 { 1.0 } else { -1.0 });
        let upper = self.config.class_weight.sample_weights(y) * self.config.c;

        // Bias handled as an extra constant feature
        let q_diag: Vec<f64> = x.outer_iter().map(|row| row.dot(&row) + 1.0).collect();

        let mut w = Array1::<f64>::zeros(d);
        let mut b = 0.0;
        let mut alpha = vec![0.0f64; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.max_iter {
            order.shuffle(&mut rng);
            let mut pg_max = f64::NEG_INFINITY;
            let mut pg_min = f64::INFINITY;

            for &i in &order {
                let row = x.row(i);
                let g = signs[i] * (row.dot(&w) + b) - 1.0;
                let pg = if alpha[i] <= 0.0 {
                    g.min(0.0)
                } else if alpha[i] >= upper[i] {
                    g.max(0.0)
                } else {
                    g
                };
                pg_max = pg_max.max(pg);
                pg_min = pg_min.min(pg);

                if pg.abs() > 1e-12 {
                    let old = alpha[i];
                    alpha[i] = (old - g / q_diag[i]).clamp(0.0, upper[i]);
                    let delta = (alpha[i] - old) * signs[i];
                    w.scaled_add(delta, &row);
                    b += delta;
                }
            }

            if pg_max - pg_min < self.config.tol {
                break;
            }
        }

        self.weights = Some(w);
        self.bias = b;
        Ok(())
    }

    /// Signed distance-like score `w·x + b`
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.weights.as_ref().ok_or(CrashRiskError::ModelNotFitted)?;
        check_width(x, w.len())?;
        Ok(x.dot(w) + self.bias)
    }
}

impl Classifier for LinearSvm {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LinearSvm::fit(self, x, y)
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.decision_function(x)
    }

    fn has_probability_output(&self) -> bool {
        false
    }

    fn feature_weights(&self) -> Option<FeatureWeights> {
        self.weights
            .as_ref()
            .map(|w| FeatureWeights::Coefficients(w.to_vec()))
    }
}
