//! Classification metrics

use crate::error::{CrashRiskError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

fn check_lengths(a: &Array1<f64>, b: &Array1<f64>) -> Result<()> {
    if a.len() != b.len() {
        return Err(CrashRiskError::ShapeError {
            expected: format!("length {}", a.len()),
            actual: format!("length {}", b.len()),
        });
    }
    if a.is_empty() {
        return Err(CrashRiskError::ValidationError("empty input".to_string()));
    }
    Ok(())
}

/// Whether the target holds exactly two distinct values
pub fn is_binary(y: &Array1<f64>) -> bool {
    y.iter().map(|v| v.to_bits()).collect::<HashSet<_>>().len() == 2
}

/// Brier score: mean squared difference between probability and outcome
pub fn brier_score(y_true: &Array1<f64>, probs: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, probs)?;
    Ok(probs
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &y)| (p - y).powi(2))
        .sum::<f64>()
        / probs.len() as f64)
}

/// F1 score of the positive class; 0.0 when there are no predicted or actual positives
pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let (mut tp, mut fp, mut fn_) = (0.0, 0.0, 0.0);
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (t > 0.5, p > 0.5) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_ += 1.0,
            (false, false) => {}
        }
    }
    let denom = 2.0 * tp + fp + fn_;
    Ok(if denom > 0.0 { 2.0 * tp / denom } else { 0.0 })
}

/// Accuracy of thresholded labels
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|&(&t, &p)| (t > 0.5) == (p > 0.5))
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Area under the ROC curve via average ranks (ties share rank)
pub fn roc_auc_score(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, scores)?;
    let n_pos = y_true.iter().filter(|&&y| y > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(CrashRiskError::ValidationError(
            "ROC-AUC is undefined when only one class is present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if y_true[k] > 0.5 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Cross-validation scoring metric; higher is better for every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RocAuc,
    F1,
    Accuracy,
    NegBrierScore,
}

impl Metric {
    /// Score `probs` (and their 0.5-thresholded labels) against `y_true`
    pub fn score(&self, y_true: &Array1<f64>, probs: &Array1<f64>) -> Result<f64> {
        let labels = || probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 });
        match self {
            Metric::RocAuc => roc_auc_score(y_true, probs),
            Metric::F1 => f1_score(y_true, &labels()),
            Metric::Accuracy => accuracy(y_true, &labels()),
            Metric::NegBrierScore => brier_score(y_true, probs).map(|b| -b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::RocAuc => "roc_auc",
            Metric::F1 => "f1",
            Metric::Accuracy => "accuracy",
            Metric::NegBrierScore => "neg_brier_score",
        }
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::RocAuc
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = CrashRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roc_auc" => Ok(Metric::RocAuc),
            "f1" => Ok(Metric::F1),
            "accuracy" => Ok(Metric::Accuracy),
            "neg_brier_score" => Ok(Metric::NegBrierScore),
            other => Err(CrashRiskError::ConfigError(format!(
                "unknown scoring metric '{}'",
                other
            ))),
        }
    }
}

/// F1, ROC-AUC and Brier for one set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Present only for binary targets
    pub f1: Option<f64>,
    /// Present only for binary targets
    pub roc_auc: Option<f64>,
    pub brier: f64,
}

impl MetricSet {
    pub fn compute(y_true: &Array1<f64>, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<Self> {
        let brier = brier_score(y_true, probs)?;
        let (f1, roc_auc) = if is_binary(y_true) {
            (Some(f1_score(y_true, labels)?), Some(roc_auc_score(y_true, probs)?))
        } else {
            (None, None)
        };
        Ok(Self { f1, roc_auc, brier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_roc_auc_perfect_and_reversed() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc_score(&y, &array![0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc_score(&y, &array![0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn test_roc_auc_ties() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        assert!((roc_auc_score(&y, &array![0.5, 0.5, 0.5, 0.5]).unwrap() - 0.5).abs() < 1e-12);
        // one of four positive/negative pairs misordered
        let auc = roc_auc_score(&array![0.0, 0.0, 1.0, 1.0], &array![0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class() {
        assert!(roc_auc_score(&array![1.0, 1.0], &array![0.2, 0.3]).is_err());
    }

    #[test]
    fn test_f1() {
        let y = array![1.0, 1.0, 0.0, 0.0];
        let pred = array![1.0, 0.0, 1.0, 0.0];
        assert!((f1_score(&y, &pred).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(f1_score(&array![0.0, 0.0], &array![0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_brier() {
        let y = array![1.0, 0.0];
        assert!((brier_score(&y, &array![0.8, 0.4]).unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_metric_set_non_binary_keeps_brier() {
        let y = array![0.0, 1.0, 2.0];
        let probs = array![0.1, 0.6, 0.9];
        let labels = array![0.0, 1.0, 1.0];
        let metrics = MetricSet::compute(&y, &probs, &labels).unwrap();
        assert!(metrics.f1.is_none() && metrics.roc_auc.is_none());
        assert!(metrics.brier > 0.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("roc_auc".parse::<Metric>().unwrap(), Metric::RocAuc);
        assert!("auc_pr".parse::<Metric>().unwrap_err().is_configuration());
    }
}
