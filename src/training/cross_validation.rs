//! K-fold index generation for cross-validated tuning

use crate::error::{CrashRiskError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Contiguous folds over (optionally shuffled) row order
    KFold { n_splits: usize, shuffle: bool },
    /// Folds that keep each class spread evenly
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Seed fold shuffling
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        match self.strategy {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => n_splits,
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits for a target of `y.len()` rows
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let n_splits = self.n_splits();
        if n_splits < 2 {
            return Err(CrashRiskError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(CrashRiskError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        match self.strategy {
            CVStrategy::KFold { shuffle, .. } => Ok(self.k_fold_split(n_samples, n_splits, shuffle)),
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                Ok(self.stratified_k_fold_split(y, n_splits, shuffle))
            }
        }
    }

    /// Contiguous blocks over the (optionally shuffled) row order; the first
    /// `n % k` folds take one extra row
    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut order: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            order.shuffle(&mut self.rng());
        }

        let (base, extra) = (n_samples / n_splits, n_samples % n_splits);
        let mut fold_of = vec![0usize; n_samples];
        let mut rows = order.into_iter();
        for fold in 0..n_splits {
            let size = base + usize::from(fold < extra);
            for row in rows.by_ref().take(size) {
                fold_of[row] = fold;
            }
        }
        folds_from_assignment(&fold_of, n_splits)
    }

    /// Deal each class round-robin across folds, continuing where the
    /// previous class stopped
    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (row, &label) in y.iter().enumerate() {
            by_class.entry(label.round() as i64).or_default().push(row);
        }
        if shuffle {
            let mut rng = self.rng();
            by_class.values_mut().for_each(|rows| rows.shuffle(&mut rng));
        }

        let mut fold_of = vec![0usize; y.len()];
        for (position, row) in by_class.into_values().flatten().enumerate() {
            fold_of[row] = position % n_splits;
        }
        folds_from_assignment(&fold_of, n_splits)
    }
}

/// Build one split per fold from each row's fold number. Index lists stay
/// ascending.
fn folds_from_assignment(fold_of: &[usize], n_splits: usize) -> Vec<CVSplit> {
    (0..n_splits)
        .map(|fold_idx| {
            let (test_indices, train_indices) =
                (0..fold_of.len()).partition(|&row| fold_of[row] == fold_idx);
            CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            }
        })
        .collect()
}

/// Fail with [`CrashRiskError::InsufficientClassBalance`] when either side of
/// a fold holds a single class
pub fn ensure_both_classes(y: &Array1<f64>, split: &CVSplit, family: &str) -> Result<()> {
    let has_both = |indices: &[usize]| {
        let mut seen_pos = false;
        let mut seen_neg = false;
        for &i in indices {
            if y[i] > 0.5 {
                seen_pos = true;
            } else {
                seen_neg = true;
            }
            if seen_pos && seen_neg {
                return true;
            }
        }
        false
    };

    if has_both(&split.train_indices) && has_both(&split.test_indices) {
        Ok(())
    } else {
        Err(CrashRiskError::InsufficientClassBalance {
            family: family.to_string(),
            fold: split.fold_idx,
        })
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len().max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / n_folds;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let y = Array1::zeros(100);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffled_k_fold_reproducible() {
        let y = Array1::zeros(30);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true }).with_random_state(9);
        let a = cv.split(&y).unwrap();
        let b = cv.split(&y).unwrap();
        assert_eq!(a[1].test_indices, b[1].test_indices);
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            assert!(ensure_both_classes(&y, split, "logistic_regression").is_ok());
        }
    }

    #[test]
    fn test_single_class_fold_detected() {
        let y = Array1::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: false });
        let splits = cv.split(&y).unwrap();

        let err = ensure_both_classes(&y, &splits[1], "xgboost").unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_too_few_samples() {
        let y = Array1::zeros(3);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(&y).is_err());
    }
}
