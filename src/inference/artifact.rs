//! Persisted scoring model

use crate::error::{CrashRiskError, Result};
use crate::optimizer::search_space::TrialParams;
use crate::preprocessing::features::FeatureSpec;
use crate::training::models::{Classifier, FeatureWeights, FittedModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// The winning fitted model together with the exact feature order it expects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringModelArtifact {
    pub family: String,
    pub model: FittedModel,
    /// Matrix column order used at fit time and required at scoring time
    pub required_features: Vec<String>,
    /// Raw categorical/continuous columns to expand before scoring
    pub feature_spec: FeatureSpec,
    pub target: String,
    pub params: TrialParams,
}

impl ScoringModelArtifact {
    pub fn new(
        family: impl Into<String>,
        model: FittedModel,
        required_features: Vec<String>,
        feature_spec: FeatureSpec,
        target: impl Into<String>,
        params: TrialParams,
    ) -> Self {
        Self {
            family: family.into(),
            model,
            required_features,
            feature_spec,
            target: target.into(),
            params,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!(path = %path.as_ref().display(), family = %self.family, "Saved scoring model");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CrashRiskError::DataError(format!("Failed to open model {}: {}", path.display(), e))
        })?;
        let artifact: Self = serde_json::from_reader(BufReader::new(file))?;
        if artifact.required_features.is_empty() {
            return Err(CrashRiskError::ValidationError(
                "scoring model has no required features".to_string(),
            ));
        }
        Ok(artifact)
    }

    /// Feature name to importance or coefficient
    pub fn feature_weight_table(&self) -> Result<BTreeMap<String, f64>> {
        let weights = self.model.feature_weights().ok_or(CrashRiskError::ModelNotFitted)?;
        let values = weights.values();
        if values.len() != self.required_features.len() {
            return Err(CrashRiskError::ShapeError {
                expected: format!("{} weights", self.required_features.len()),
                actual: format!("{} weights", values.len()),
            });
        }
        Ok(self
            .required_features
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect())
    }

    /// Whether the table holds tree importances rather than linear coefficients
    pub fn has_importances(&self) -> bool {
        matches!(self.model.feature_weights(), Some(FeatureWeights::Importances(_)))
    }

    pub fn save_feature_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        let table = self.feature_weight_table()?;
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &table)?;
        Ok(())
    }
}
