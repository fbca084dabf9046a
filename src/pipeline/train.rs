//! End-to-end training run
//!
//! Reads the labeled table, expands features, splits once, tunes and
//! evaluates every configured family on that split, selects the winner,
//! refits it on all rows and writes the scoring model with its reports.

use crate::error::{CrashRiskError, Result};
use crate::evaluation::evaluator::{EvaluationResult, Evaluator};
use crate::evaluation::selection::{refit_full, select_best, Selection};
use crate::inference::artifact::ScoringModelArtifact;
use crate::optimizer::tuner::{Tuner, TuningResult};
use crate::pipeline::config::PipelineConfig;
use crate::preprocessing::features::{FeatureProcessor, FeatureSpec};
use crate::training::registry::ModelRegistry;
use crate::training::split::{take_rows, DatasetSplitter, LabeledDataset, SplitData, SplitStrategy};
use crate::utils::data_loader::{DataLoader, DataSaver};
use crate::utils::datetime::column_timestamps;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything a training run learned, written as `metrics.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub name: Option<String>,
    pub rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub features: Vec<String>,
    pub linear_features: Vec<String>,
    pub tuning: Vec<TuningResult>,
    pub evaluations: Vec<EvaluationResult>,
    pub selection: Selection,
}

/// File names written into the output directory
pub mod outputs {
    pub const DATA_MODEL: &str = "data_model.csv";
    pub const FEATURES: &str = "features.json";
    pub const MODEL: &str = "model.json";
    pub const FEATURE_IMPORTANCES: &str = "feature_importances.json";
    pub const METRICS: &str = "metrics.json";
}

#[derive(Debug, Serialize)]
struct FeatureLists<'a> {
    features: &'a [String],
    linear_features: &'a [String],
}

/// A configured training run
#[derive(Debug, Clone)]
pub struct TrainingRun {
    config: PipelineConfig,
    registry: ModelRegistry,
}

impl TrainingRun {
    /// Validate `config` against the standard registry
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_registry(config, ModelRegistry::standard())
    }

    pub fn with_registry(config: PipelineConfig, registry: ModelRegistry) -> Result<Self> {
        config.validate(&registry)?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Path of the labeled input table under `data_dir`
    pub fn input_path(&self, data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join(&self.config.merged_data)
    }

    /// Read the configured table from `data_dir` and train
    pub fn run(&self, data_dir: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<TrainingReport> {
        let raw = DataLoader::new().load_csv(self.input_path(data_dir))?;
        self.run_frame(raw, out_dir)
    }

    /// Train on an in-memory labeled table
    pub fn run_frame(&self, raw: DataFrame, out_dir: impl AsRef<Path>) -> Result<TrainingReport> {
        let out_dir = out_dir.as_ref();
        std::fs::create_dir_all(out_dir)?;
        let config = &self.config;

        let spec = config.feature_spec().resolve(&raw);
        if spec.is_empty() {
            return Err(CrashRiskError::ConfigError(
                "none of the configured features exist in the dataset".to_string(),
            ));
        }
        if raw.column(&config.target).is_err() {
            return Err(CrashRiskError::ConfigError(format!(
                "target column '{}' not found",
                config.target
            )));
        }

        let data_model = self.data_model(raw, &spec)?;
        let rows = data_model.height();
        info!(rows, continuous = spec.continuous.len(), categorical = spec.categorical.len(), "Loaded data model");

        let mut processed = FeatureProcessor::new().process(data_model, &spec)?;
        DataSaver::save_csv(&mut processed.frame, out_dir.join(outputs::DATA_MODEL))?;
        write_json(
            out_dir.join(outputs::FEATURES),
            &FeatureLists {
                features: &processed.features,
                linear_features: &processed.linear_features,
            },
        )?;

        let dataset = LabeledDataset::new(processed.frame, config.target.as_str())?;
        let features = processed.features;
        let linear_features = processed.linear_features;

        let mut splitter = DatasetSplitter::new(config.split.pct)?.with_strategy(self.split_strategy());
        if let Some(seed) = config.split_seed() {
            splitter = splitter.with_random_state(seed);
        }
        let split = splitter.split_indices(&dataset)?;
        let (n_train, n_test) = (split.n_train(), split.n_test());

        let mut tuner = Tuner::new(self.registry.clone(), config.cv_config()?);
        let mut evaluator = Evaluator::new(self.registry.clone());
        if let Some(seed) = config.seed {
            tuner = tuner.with_random_state(seed);
            evaluator = evaluator.with_random_state(seed);
        }
        let calibration = config.calibration_method()?;

        let mut tuning = Vec::with_capacity(config.models.len());
        let mut evaluations = Vec::with_capacity(config.models.len());
        for name in &config.models {
            let family = self.registry.get(name)?;
            let family_features = if family.uses_linear_features {
                &linear_features
            } else {
                &features
            };
            let data = SplitData::extract(&dataset, split.clone(), family_features)?;

            let tuned = tuner.tune(name, family_features, &data.train_x, &data.train_y, None)?;
            let evaluation = evaluator.evaluate(
                name,
                &tuned.best_params,
                family_features,
                &data,
                Some(calibration),
            )?;
            tuning.push(tuned);
            evaluations.push(evaluation);
        }

        let selection = select_best(&evaluations, config.perf_cutoff)?;
        let x = dataset.feature_matrix(&selection.features)?;
        let y = dataset.target_values()?;
        let model = refit_full(&self.registry, &selection, &x, &y, config.seed)?;

        let artifact = ScoringModelArtifact::new(
            selection.family.clone(),
            model,
            selection.features.clone(),
            spec,
            config.target.clone(),
            selection.params.clone(),
        );
        artifact.save(out_dir.join(outputs::MODEL))?;
        artifact.save_feature_weights(out_dir.join(outputs::FEATURE_IMPORTANCES))?;

        let report = TrainingReport {
            name: config.name.clone(),
            rows,
            n_train,
            n_test,
            features,
            linear_features,
            tuning,
            evaluations,
            selection,
        };
        write_json(out_dir.join(outputs::METRICS), &report)?;
        info!(dir = %out_dir.display(), family = %report.selection.family, "Training run complete");
        Ok(report)
    }

    fn split_strategy(&self) -> SplitStrategy {
        let date = if self.config.split_by_date {
            self.config.date_column.as_deref()
        } else {
            None
        };
        SplitStrategy::from_columns(date, self.config.group_column.as_deref())
    }

    /// Sort by date when the column exists and parses, then keep only the
    /// feature, target and split columns. An unparseable date column is
    /// fatal only when the split is by date. The raw table is consumed.
    fn data_model(&self, raw: DataFrame, spec: &FeatureSpec) -> Result<DataFrame> {
        let config = &self.config;
        let date_column = config
            .date_column
            .as_deref()
            .filter(|c| raw.column(c).is_ok());

        let raw = match date_column {
            Some(column) => match column_timestamps(&raw, column) {
                Ok(timestamps) => {
                    let mut order: Vec<usize> = (0..timestamps.len()).collect();
                    order.sort_by_key(|&i| (timestamps[i].is_none(), timestamps[i]));
                    take_rows(&raw, &order)?
                }
                // Only a date split needs the timestamps
                Err(e) if !config.split_by_date => {
                    warn!(column, error = %e, "cannot order rows by date, keeping input order");
                    raw
                }
                Err(e) => return Err(e),
            },
            None => raw,
        };

        let mut keep = spec.raw_names();
        keep.push(config.target.clone());
        let extras = [
            config.group_column.as_deref(),
            date_column.filter(|_| config.split_by_date),
        ];
        for extra in extras.into_iter().flatten() {
            if raw.column(extra).is_ok() && !keep.iter().any(|k| k == extra) {
                keep.push(extra.to_string());
            }
        }
        Ok(raw.select(keep)?)
    }
}

fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let file = File::create(path.as_ref())?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}
