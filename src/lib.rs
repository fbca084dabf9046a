//! Crash risk - road segment crash risk modelling
//!
//! This crate trains and applies a binary classifier estimating crash risk
//! per road segment:
//! - Feature expansion (one-hot indicators, log transforms)
//! - Random, date-ordered and group-aware train/test splitting
//! - Randomized cross-validated hyperparameter search
//! - Raw and calibrated held-out evaluation, best-family selection
//! - A persisted scoring model and the prediction path that uses it
//!
//! # Modules
//!
//! - [`preprocessing`] - Feature specification and expansion
//! - [`training`] - Labeled dataset, splitting, cross-validation, model families
//! - [`optimizer`] - Search spaces and the randomized-search tuner
//! - [`calibration`] - Platt scaling and isotonic calibration
//! - [`evaluation`] - Metrics, evaluation and model selection
//! - [`inference`] - Scoring model artifact, enrichment and scoring
//! - [`pipeline`] - Configured training and prediction runs
//! - [`cli`] - Command-line interface

pub mod error;

pub mod preprocessing;
pub mod training;
pub mod optimizer;
pub mod calibration;
pub mod evaluation;
pub mod inference;
pub mod pipeline;

pub mod utils;
pub mod cli;

pub use error::{CrashRiskError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{CrashRiskError, Result};

    pub use crate::preprocessing::{FeatureProcessor, FeatureSpec, ProcessedFeatures};

    pub use crate::training::{
        Classifier, DatasetSplitter, FittedModel, LabeledDataset, ModelRegistry, SplitStrategy,
    };

    pub use crate::optimizer::{CvConfig, SearchSpace, Tuner, TuningResult};

    pub use crate::calibration::{CalibratedModel, CalibrationMethod, Calibrator};

    pub use crate::evaluation::{select_best, EvaluationResult, Evaluator, Metric, MetricSet};

    pub use crate::inference::{ScoringEngine, ScoringModelArtifact};

    pub use crate::pipeline::{PipelineConfig, PredictOptions, PredictionRun, TrainingReport, TrainingRun};
}
