//! Training and prediction runs
//!
//! Ties the components together: a YAML-configured training run that ends
//! in a persisted scoring model, and a prediction run that scores a road
//! segment table with it.

pub mod config;
pub mod predict;
pub mod train;

pub use config::{CvSection, PipelineConfig, SplitConfig};
pub use predict::{PredictOptions, PredictionRun};
pub use train::{outputs, TrainingReport, TrainingRun};
