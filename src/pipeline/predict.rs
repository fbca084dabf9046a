//! Prediction run over a road-segment table

use crate::error::Result;
use crate::inference::engine::{write_predictions, ScoringEngine};
use crate::inference::enrich::{
    attach_recent_crash_counts, drop_sparse_columns, fill_nulls, stamp_clock, DEFAULT_NULL_THRESHOLD,
};
use crate::utils::data_loader::DataLoader;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// Settings for preparing a prediction batch
#[derive(Debug, Clone)]
pub struct PredictOptions {
    pub segment_column: String,
    pub date_column: String,
    pub null_threshold: f64,
    /// Scoring time stamped onto every row and the reference for crash windows
    pub now: NaiveDateTime,
}

impl PredictOptions {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            segment_column: "segment_id".to_string(),
            date_column: "DATE_TIME".to_string(),
            null_threshold: DEFAULT_NULL_THRESHOLD,
            now,
        }
    }
}

/// Scores road segments with a trained artifact
#[derive(Debug, Clone)]
pub struct PredictionRun {
    engine: ScoringEngine,
    options: PredictOptions,
}

impl PredictionRun {
    pub fn new(engine: ScoringEngine, options: PredictOptions) -> Self {
        Self { engine, options }
    }

    pub fn load(model_path: impl AsRef<Path>, options: PredictOptions) -> Result<Self> {
        Ok(Self::new(ScoringEngine::load(model_path)?, options))
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Prune, fill, stamp the clock and attach recent crash counts
    pub fn prepare(&self, roads: DataFrame, crashes: Option<DataFrame>) -> Result<DataFrame> {
        let threshold = self.options.null_threshold;
        let roads = fill_nulls(drop_sparse_columns(roads, threshold)?)?;
        let roads = stamp_clock(roads, self.options.now)?;

        match crashes {
            Some(crashes) => {
                let crashes = drop_sparse_columns(crashes, threshold)?;
                attach_recent_crash_counts(
                    roads,
                    &crashes,
                    &self.options.segment_column,
                    &self.options.date_column,
                    self.options.now,
                )
            }
            None => Ok(roads),
        }
    }

    /// Prepare and score, returning the table with a `predictions` column
    pub fn score(&self, roads: DataFrame, crashes: Option<DataFrame>) -> Result<DataFrame> {
        let prepared = self.prepare(roads, crashes)?;
        self.engine.score(&prepared)
    }

    /// Read the input tables, score them and write both prediction files
    pub fn run(
        &self,
        roads_path: impl AsRef<Path>,
        crashes_path: Option<&Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<DataFrame> {
        let loader = DataLoader::new();
        let roads = loader.load_csv(roads_path)?;
        let crashes = crashes_path.map(|p| loader.load_csv(p)).transpose()?;
        info!(segments = roads.height(), with_crashes = crashes.is_some(), "Loaded prediction inputs");

        let mut scored = self.score(roads, crashes)?;
        write_predictions(&mut scored, out_dir)?;
        Ok(scored)
    }
}
