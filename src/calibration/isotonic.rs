//! Isotonic regression calibration

use crate::calibration::Calibrator;
use crate::error::{CrashRiskError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Isotonic regression calibrator
///
/// Non-parametric calibration that fits a monotonically increasing step
/// function over the scores, interpolated linearly between fitted thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicRegression {
    /// Fitted thresholds (distinct scores, ascending)
    x_values: Option<Vec<f64>>,
    /// Fitted values at each threshold
    y_values: Option<Vec<f64>>,
    /// Whether to clip predictions to [0, 1]
    clip: bool,
}

impl IsotonicRegression {
    pub fn new() -> Self {
        Self {
            x_values: None,
            y_values: None,
            clip: true,
        }
    }

    /// Set whether to clip output to [0, 1]
    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    /// Pool Adjacent Violators over weighted points, returning one value per point
    fn pava(y: &[f64], weights: &[f64]) -> Vec<f64> {
        // (mean, weight, count) per pooled block
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(y.len());

        for (&value, &weight) in y.iter().zip(weights.iter()) {
            blocks.push((value, weight, 1));
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.0 <= last.0 {
                    break;
                }
                let weight = prev.1 + last.1;
                let merged = ((prev.0 * prev.1 + last.0 * last.1) / weight, weight, prev.2 + last.2);
                blocks.pop();
                if let Some(top) = blocks.last_mut() {
                    *top = merged;
                }
            }
        }

        blocks
            .into_iter()
            .flat_map(|(mean, _, count)| std::iter::repeat(mean).take(count))
            .collect()
    }

    fn interpolate(x_vals: &[f64], y_vals: &[f64], x: f64) -> f64 {
        let last = x_vals.len() - 1;
        if x <= x_vals[0] {
            return y_vals[0];
        }
        if x >= x_vals[last] {
            return y_vals[last];
        }

        let hi = x_vals.partition_point(|&v| v <= x);
        let lo = hi - 1;
        let (x0, x1) = (x_vals[lo], x_vals[hi]);
        let (y0, y1) = (y_vals[lo], y_vals[hi]);
        if (x1 - x0).abs() < 1e-12 {
            return y0;
        }
        y0 + (x - x0) / (x1 - x0) * (y1 - y0)
    }
}

impl Default for IsotonicRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator for IsotonicRegression {
    fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        let n = scores.len();
        if n != labels.len() {
            return Err(CrashRiskError::ValidationError(
                "Scores and labels must have same length".to_string(),
            ));
        }
        if n == 0 {
            return Err(CrashRiskError::ValidationError("Empty input".to_string()));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by(|&a, &b| {
            scores[a]
                .partial_cmp(&scores[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Tied scores collapse into one weighted point
        let mut x_unique: Vec<f64> = Vec::new();
        let mut y_mean: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for &i in &indices {
            match x_unique.last() {
                Some(&x) if x == scores[i] => {
                    let k = x_unique.len() - 1;
                    y_mean[k] = (y_mean[k] * weights[k] + labels[i]) / (weights[k] + 1.0);
                    weights[k] += 1.0;
                }
                _ => {
                    x_unique.push(scores[i]);
                    y_mean.push(labels[i]);
                    weights.push(1.0);
                }
            }
        }

        let fitted = Self::pava(&y_mean, &weights);
        self.x_values = Some(x_unique);
        self.y_values = Some(fitted);
        Ok(())
    }

    fn calibrate(&self, scores: &Array1<f64>) -> Result<Array1<f64>> {
        let (x_vals, y_vals) = match (&self.x_values, &self.y_values) {
            (Some(x), Some(y)) if !x.is_empty() => (x, y),
            _ => return Err(CrashRiskError::ModelNotFitted),
        };

        Ok(scores.mapv(|s| {
            let c = Self::interpolate(x_vals, y_vals, s);
            if self.clip {
                c.clamp(0.0, 1.0)
            } else {
                c
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn is_monotone(values: &Array1<f64>) -> bool {
        values.windows(2).into_iter().all(|w| w[1] >= w[0] - 1e-12)
    }

    #[test]
    fn test_isotonic_basic() {
        let probs = array![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        let labels = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        let mut calibrator = IsotonicRegression::new();
        let calibrated = calibrator.fit_calibrate(&probs, &labels).unwrap();

        assert!(is_monotone(&calibrated));
        assert_eq!(calibrated[0], 0.0);
        assert_eq!(calibrated[8], 1.0);
    }

    #[test]
    fn test_isotonic_pools_violations() {
        let probs = array![0.1, 0.3, 0.5, 0.7, 0.9];
        let labels = array![0.0, 1.0, 0.0, 1.0, 1.0];

        let mut calibrator = IsotonicRegression::new();
        let calibrated = calibrator.fit_calibrate(&probs, &labels).unwrap();

        assert!(is_monotone(&calibrated));
        assert!((calibrated[1] - 0.5).abs() < 1e-12);
        assert!((calibrated[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_pava_weighted_mean() {
        let result = IsotonicRegression::pava(&[1.0, 0.0, 1.0], &[1.0, 3.0, 1.0]);
        assert!((result[0] - 0.25).abs() < 1e-12);
        assert!((result[1] - 0.25).abs() < 1e-12);
        assert_eq!(result[2], 1.0);
    }

    #[test]
    fn test_out_of_range_scores_clamp_to_ends() {
        let mut calibrator = IsotonicRegression::new();
        calibrator
            .fit(&array![-1.0, 0.0, 1.0, 2.0], &array![0.0, 0.0, 1.0, 1.0])
            .unwrap();
        let out = calibrator.calibrate(&array![-10.0, 10.0]).unwrap();
        assert_eq!(out, array![0.0, 1.0]);
    }

    #[test]
    fn test_isotonic_not_fitted() {
        assert!(IsotonicRegression::new().calibrate(&array![0.5]).is_err());
    }
}
