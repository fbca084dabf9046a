//! Classifier capability interface and the serializable fitted-model wrapper

use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::linear_models::LogisticRegression;
use super::svm::LinearSvm;
use super::xgboost::XGBoostClassifier;

/// Per-feature weights exposed by a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum FeatureWeights {
    /// Split-based importances of a tree ensemble
    Importances(Vec<f64>),
    /// Coefficients of a linear decision function
    Coefficients(Vec<f64>),
}

impl FeatureWeights {
    pub fn values(&self) -> &[f64] {
        match self {
            FeatureWeights::Importances(v) | FeatureWeights::Coefficients(v) => v,
        }
    }
}

/// Binary classifier interface used by tuning, evaluation and scoring
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Positive-class probability. Estimators without probability output
    /// return their raw decision output as the probability proxy.
    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Whether [`Classifier::predict_probability`] yields calibrated-scale probabilities
    fn has_probability_output(&self) -> bool {
        true
    }

    /// Class label: probability (or proxy) thresholded at 0.5
    fn predict_label(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_probability(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn feature_weights(&self) -> Option<FeatureWeights> {
        None
    }
}

/// Any supported fitted model, serializable into the scoring artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedModel {
    LogisticRegression(LogisticRegression),
    Xgboost(XGBoostClassifier),
    LinearSvm(LinearSvm),
}

impl FittedModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::LogisticRegression(m) => m,
            FittedModel::Xgboost(m) => m,
            FittedModel::LinearSvm(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            FittedModel::LogisticRegression(m) => m,
            FittedModel::Xgboost(m) => m,
            FittedModel::LinearSvm(m) => m,
        }
    }
}

impl Classifier for FittedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_probability(x)
    }

    fn has_probability_output(&self) -> bool {
        self.inner().has_probability_output()
    }

    fn predict_label(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_label(x)
    }

    fn feature_weights(&self) -> Option<FeatureWeights> {
        self.inner().feature_weights()
    }
}

/// Check that `x` and `y` agree on the number of rows
pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(crate::error::CrashRiskError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(crate::error::CrashRiskError::ValidationError(
            "cannot fit on an empty matrix".to_string(),
        ));
    }
    Ok(())
}

/// Check the feature count at prediction time
pub(crate) fn check_width(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(crate::error::CrashRiskError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
