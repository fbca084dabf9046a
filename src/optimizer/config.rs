//! Cross-validation configuration for hyperparameter search

use crate::error::{CrashRiskError, Result};
use crate::evaluation::metrics::Metric;
use crate::training::cross_validation::CVStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for randomized cross-validated search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    /// Number of folds
    pub folds: usize,

    /// Number of sampled parameter combinations
    pub iterations: usize,

    /// Shuffle rows before assigning folds
    pub shuffle: bool,

    /// Metric to maximize
    pub metric: Metric,

    /// Preserve the class ratio in each fold
    pub stratified: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            iterations: 5,
            shuffle: true,
            metric: Metric::RocAuc,
            stratified: false,
        }
    }
}

impl CvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        if self.stratified {
            CVStrategy::StratifiedKFold {
                n_splits: self.folds,
                shuffle: self.shuffle,
            }
        } else {
            CVStrategy::KFold {
                n_splits: self.folds,
                shuffle: self.shuffle,
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.folds < 2 {
            return Err(CrashRiskError::ConfigError(format!(
                "cv.folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.iterations == 0 {
            return Err(CrashRiskError::ConfigError(
                "cv.iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cv = CvConfig::default();
        assert_eq!(cv.folds, 5);
        assert_eq!(cv.iterations, 5);
        assert!(cv.shuffle);
        assert_eq!(cv.metric, Metric::RocAuc);
        assert!(cv.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        let err = CvConfig::new().with_folds(1).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cv: CvConfig = serde_yaml::from_str("folds: 3\nmetric: f1\n").unwrap();
        assert_eq!(cv.folds, 3);
        assert_eq!(cv.metric, Metric::F1);
        assert_eq!(cv.iterations, 5);
    }
}
