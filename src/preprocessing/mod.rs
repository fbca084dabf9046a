//! Feature preprocessing
//!
//! Resolves the configured feature lists against a table and expands them
//! into model-ready columns:
//! - categorical columns into one indicator column per observed level
//! - continuous columns into `log(x + 1)` columns

pub mod features;

pub use features::{
    indicator_name, log_name, log_transform, sort_levels, FeatureProcessor, FeatureSpec,
    ProcessedFeatures,
};
