//! Platt scaling (sigmoid calibration)

use crate::calibration::Calibrator;
use crate::error::{CrashRiskError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Platt scaling calibrator
///
/// Fits `P(y=1|f) = 1 / (1 + exp(-(A*f + B)))` over uncalibrated scores `f`
/// by Newton's method on the log loss, with Platt's smoothed targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    a: Option<f64>,
    b: Option<f64>,
    max_iter: usize,
    /// Stop once both Newton updates fall below this
    tol: f64,
}

impl PlattScaling {
    pub fn new() -> Self {
        Self {
            a: None,
            b: None,
            max_iter: 100,
            tol: 1e-10,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted `(A, B)`, if any
    pub fn parameters(&self) -> Option<(f64, f64)> {
        match (self.a, self.b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}

/// Platt's out-of-sample targets: `(N+ + 1)/(N+ + 2)` for positives,
/// `1/(N- + 2)` for negatives
fn smoothed_targets(labels: &Array1<f64>) -> Array1<f64> {
    let positives = labels.iter().filter(|&&y| y > 0.5).count() as f64;
    let negatives = labels.len() as f64 - positives;
    let hi = (positives + 1.0) / (positives + 2.0);
    let lo = 1.0 / (negatives + 2.0);
    labels.mapv(|y| if y > 0.5 { hi } else { lo })
}

/// One Newton step on the log loss; `None` when the Hessian is singular
fn newton_step(scores: &Array1<f64>, targets: &Array1<f64>, a: f64, b: f64) -> Option<(f64, f64)> {
    // Small ridge on the diagonal
    let mut h = [[1e-6, 0.0], [0.0, 1e-6]];
    let mut g = [0.0, 0.0];

    for (&f, &t) in scores.iter().zip(targets.iter()) {
        let p = sigmoid(a * f + b);
        let w = (p * (1.0 - p)).max(1e-12);
        g[0] += f * (p - t);
        g[1] += p - t;
        h[0][0] += f * f * w;
        h[0][1] += f * w;
        h[1][1] += w;
    }

    let det = h[0][0] * h[1][1] - h[0][1] * h[0][1];
    if det.abs() < 1e-12 {
        return None;
    }
    Some((
        (h[1][1] * g[0] - h[0][1] * g[1]) / det,
        (h[0][0] * g[1] - h[0][1] * g[0]) / det,
    ))
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Calibrator for PlattScaling {
    fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        if scores.len() != labels.len() {
            return Err(CrashRiskError::ShapeError {
                expected: format!("{} labels", scores.len()),
                actual: labels.len().to_string(),
            });
        }
        if scores.is_empty() {
            return Err(CrashRiskError::ValidationError(
                "cannot fit Platt scaling on zero samples".to_string(),
            ));
        }

        let targets = smoothed_targets(labels);
        let (mut a, mut b) = (1.0, 0.0);
        for _ in 0..self.max_iter {
            let Some((da, db)) = newton_step(scores, &targets, a, b) else {
                break;
            };
            a -= da;
            b -= db;
            if da.abs().max(db.abs()) < self.tol {
                break;
            }
        }

        if !(a.is_finite() && b.is_finite()) {
            return Err(CrashRiskError::ComputationError(format!(
                "Platt scaling diverged (a = {}, b = {})",
                a, b
            )));
        }
        self.a = Some(a);
        self.b = Some(b);
        Ok(())
    }

    fn calibrate(&self, scores: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, b) = self.parameters().ok_or(CrashRiskError::ModelNotFitted)?;
        Ok(scores.mapv(|f| sigmoid(a * f + b)))
    }
}
