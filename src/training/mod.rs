//! Model training module
//!
//! Provides the labeled dataset and its train/test splitter, k-fold
//! cross-validation, the supported classifier families and their registry.

pub mod cross_validation;
pub mod linear_models;
pub mod models;
pub mod registry;
pub mod split;
pub mod svm;
pub mod xgboost;

pub use cross_validation::{ensure_both_classes, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use linear_models::{ClassWeight, LogisticRegression};
pub use models::{Classifier, FeatureWeights, FittedModel};
pub use registry::{FamilyContext, ModelFamily, ModelRegistry};
pub use split::{take_rows, DatasetSplitter, LabeledDataset, Split, SplitData, SplitStrategy};
pub use svm::{LinearSvm, SvmConfig};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};
