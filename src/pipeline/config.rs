//! Training run configuration
//!
//! Loaded from the YAML file shared with the other pipeline stages; keys
//! this crate does not use are ignored.

use crate::calibration::CalibrationMethod;
use crate::error::{CrashRiskError, Result};
use crate::evaluation::metrics::Metric;
use crate::optimizer::config::CvConfig;
use crate::preprocessing::features::FeatureSpec;
use crate::training::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Train/test split settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows sent to the training partition
    pub pct: f64,
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { pct: 0.7, seed: None }
    }
}

/// Cross-validation settings as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CvSection {
    pub folds: usize,
    pub iterations: usize,
    pub shuffle: bool,
    pub metric: String,
}

impl Default for CvSection {
    fn default() -> Self {
        let cv = CvConfig::default();
        Self {
            folds: cv.folds,
            iterations: cv.iterations,
            shuffle: cv.shuffle,
            metric: cv.metric.to_string(),
        }
    }
}

/// Full training run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: Option<String>,
    /// Labeled input table, relative to the data directory
    pub merged_data: String,
    pub cont_feat: Vec<String>,
    pub cat_feat: Vec<String>,
    pub target: String,
    /// Rows are sorted by this column when present
    pub date_column: Option<String>,
    /// Split on whole groups of this column; takes precedence over dates
    pub group_column: Option<String>,
    /// Split chronologically on `date_column` instead of at random
    pub split_by_date: bool,
    pub split: SplitConfig,
    pub cv: CvSection,
    pub calibration: String,
    pub perf_cutoff: f64,
    pub models: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: None,
            merged_data: "merged_data.csv".to_string(),
            cont_feat: Vec::new(),
            cat_feat: Vec::new(),
            target: "TARGET".to_string(),
            date_column: Some("DATE_TIME".to_string()),
            group_column: None,
            split_by_date: false,
            split: SplitConfig::default(),
            cv: CvSection::default(),
            calibration: CalibrationMethod::default().to_string(),
            perf_cutoff: 0.5,
            models: vec!["logistic_regression".to_string(), "xgboost".to_string()],
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CrashRiskError::ConfigError(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec::new(self.cont_feat.iter().cloned(), self.cat_feat.iter().cloned())
    }

    pub fn metric(&self) -> Result<Metric> {
        self.cv.metric.parse()
    }

    pub fn calibration_method(&self) -> Result<CalibrationMethod> {
        self.calibration.parse()
    }

    pub fn cv_config(&self) -> Result<CvConfig> {
        Ok(CvConfig::new()
            .with_folds(self.cv.folds)
            .with_iterations(self.cv.iterations)
            .with_shuffle(self.cv.shuffle)
            .with_metric(self.metric()?))
    }

    /// Split seed, falling back to the master seed
    pub fn split_seed(&self) -> Option<u64> {
        self.split.seed.or(self.seed)
    }

    /// Reject settings that cannot produce a run
    pub fn validate(&self, registry: &ModelRegistry) -> Result<()> {
        if self.feature_spec().is_empty() {
            return Err(CrashRiskError::ConfigError(
                "no features configured: set cont_feat and/or cat_feat".to_string(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(CrashRiskError::ConfigError("target column name is empty".to_string()));
        }
        if !(self.split.pct > 0.0 && self.split.pct < 1.0) {
            return Err(CrashRiskError::ConfigError(format!(
                "split.pct must lie strictly between 0 and 1, got {}",
                self.split.pct
            )));
        }
        self.cv_config()?.validate()?;
        self.calibration_method()?;
        if self.models.is_empty() {
            return Err(CrashRiskError::ConfigError("no model families configured".to_string()));
        }
        for name in &self.models {
            registry.get(name)?;
        }
        Ok(())
    }
}
