//! Prediction reconciliation and scoring
//!
//! A prediction batch is expanded with the artifact's feature spec, any
//! required feature it lacks is added as an all-zero column, and the matrix
//! is assembled in the artifact's exact feature order before scoring.

use crate::error::Result;
use crate::inference::artifact::ScoringModelArtifact;
use crate::preprocessing::features::FeatureProcessor;
use crate::training::models::Classifier;
use crate::utils::data_loader::{columns_to_array2, DataSaver};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Name of the probability column attached to scored rows
pub const PREDICTION_COLUMN: &str = "predictions";

/// Add zero columns for required features missing from `df`, then select
/// exactly `required` in order
pub fn reconcile(mut df: DataFrame, required: &[String]) -> Result<DataFrame> {
    let height = df.height();
    let mut missing = 0usize;
    for name in required {
        if df.column(name).is_err() {
            df.with_column(Series::new(name.as_str().into(), vec![0.0f64; height]))?;
            missing += 1;
        }
    }
    if missing > 0 {
        debug!(missing, "filled absent features with zeros");
    }
    Ok(df.select(required.iter().map(String::as_str))?)
}

/// Scores prediction batches with a loaded artifact
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    artifact: ScoringModelArtifact,
    processor: FeatureProcessor,
}

impl ScoringEngine {
    pub fn new(artifact: ScoringModelArtifact) -> Self {
        Self {
            artifact,
            processor: FeatureProcessor::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ScoringModelArtifact::load(path)?))
    }

    pub fn artifact(&self) -> &ScoringModelArtifact {
        &self.artifact
    }

    /// Positive-class probability per row of `df`
    pub fn predict_probability(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let spec = self.artifact.feature_spec.resolve(df);
        let processed = self.processor.process(df.clone(), &spec)?;
        let reconciled = reconcile(processed.frame, &self.artifact.required_features)?;
        let x = columns_to_array2(&reconciled, &self.artifact.required_features)?;
        Ok(self.artifact.model.predict_probability(&x)?.to_vec())
    }

    /// `df` with a [`PREDICTION_COLUMN`] of probabilities attached
    pub fn score(&self, df: &DataFrame) -> Result<DataFrame> {
        let probabilities = self.predict_probability(df)?;
        let mut scored = df.clone();
        scored.with_column(Series::new(PREDICTION_COLUMN.into(), probabilities))?;
        info!(rows = scored.height(), family = %self.artifact.family, "Scored prediction batch");
        Ok(scored)
    }
}

/// Write `predictions.csv` and index-keyed `predictions.json` into `out_dir`
pub fn write_predictions(scored: &mut DataFrame, out_dir: impl AsRef<Path>) -> Result<()> {
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;
    DataSaver::save_csv(scored, out_dir.join("predictions.csv"))?;
    DataSaver::save_index_json(scored, out_dir.join("predictions.json"))?;
    info!(dir = %out_dir.display(), "Wrote predictions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_fills_and_orders() {
        let df = df!(
            "c" => &[3.0, 4.0],
            "a" => &[1.0, 2.0],
            "extra" => &["x", "y"]
        )
        .unwrap();
        let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let out = reconcile(df, &required).unwrap();
        let names: Vec<&str> = out.get_column_names().into_iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let b: Vec<Option<f64>> = out.column("b").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(b, vec![Some(0.0), Some(0.0)]);
    }
}
