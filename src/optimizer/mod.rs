//! Hyperparameter optimization module
//!
//! Randomized search over a family's parameter distributions, scored by
//! k-fold cross-validation.

pub mod config;
pub mod search_space;
pub mod tuner;

pub use config::CvConfig;
pub use search_space::{
    Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams, TrialParamsExt,
};
pub use tuner::{TrialRecord, Tuner, TuningResult};
