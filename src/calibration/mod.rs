//! Probability calibration module
//!
//! Provides post-hoc calibration of a fitted classifier on held-out data:
//! - Platt scaling (sigmoid calibration)
//! - Isotonic regression

mod isotonic;
mod platt;

pub use isotonic::IsotonicRegression;
pub use platt::PlattScaling;

use crate::error::{CrashRiskError, Result};
use crate::training::models::{Classifier, FittedModel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibration method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Platt scaling (logistic fit over scores)
    #[default]
    Sigmoid,
    /// Isotonic regression (non-parametric)
    Isotonic,
}

impl CalibrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationMethod::Sigmoid => "sigmoid",
            CalibrationMethod::Isotonic => "isotonic",
        }
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationMethod {
    type Err = CrashRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sigmoid" | "platt" => Ok(CalibrationMethod::Sigmoid),
            "isotonic" => Ok(CalibrationMethod::Isotonic),
            other => Err(CrashRiskError::ConfigError(format!(
                "unknown calibration method '{}'",
                other
            ))),
        }
    }
}

/// Trait for score calibrators
pub trait Calibrator: Send + Sync {
    /// Fit the calibrator on uncalibrated scores and true labels
    fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()>;

    /// Map scores to calibrated probabilities
    fn calibrate(&self, scores: &Array1<f64>) -> Result<Array1<f64>>;

    /// Fit and calibrate in one step
    fn fit_calibrate(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<Array1<f64>> {
        self.fit(scores, labels)?;
        self.calibrate(scores)
    }
}

/// A fitted calibrator of either method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FittedCalibrator {
    Sigmoid(PlattScaling),
    Isotonic(IsotonicRegression),
}

impl FittedCalibrator {
    fn new(method: CalibrationMethod) -> Self {
        match method {
            CalibrationMethod::Sigmoid => FittedCalibrator::Sigmoid(PlattScaling::new()),
            CalibrationMethod::Isotonic => FittedCalibrator::Isotonic(IsotonicRegression::new()),
        }
    }

    fn inner(&self) -> &dyn Calibrator {
        match self {
            FittedCalibrator::Sigmoid(c) => c,
            FittedCalibrator::Isotonic(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Calibrator {
        match self {
            FittedCalibrator::Sigmoid(c) => c,
            FittedCalibrator::Isotonic(c) => c,
        }
    }

    pub fn method(&self) -> CalibrationMethod {
        match self {
            FittedCalibrator::Sigmoid(_) => CalibrationMethod::Sigmoid,
            FittedCalibrator::Isotonic(_) => CalibrationMethod::Isotonic,
        }
    }
}

/// A prefit classifier wrapped with a calibrator fitted on separate data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedModel {
    base: FittedModel,
    calibrator: FittedCalibrator,
}

impl CalibratedModel {
    /// Fit `method` on the scores `base` gives for a held-out calibration set.
    /// `base` must already be fitted; it is not refit.
    pub fn fit(
        base: FittedModel,
        method: CalibrationMethod,
        x_cal: &Array2<f64>,
        y_cal: &Array1<f64>,
    ) -> Result<Self> {
        let mut calibrator = FittedCalibrator::new(method);
        let scores = Self::scores(&base, method, x_cal)?;
        calibrator.inner_mut().fit(&scores, y_cal)?;
        Ok(Self { base, calibrator })
    }

    /// Calibrator input for `x`: probabilities are mapped to log-odds for the
    /// sigmoid method, raw decision values pass through unchanged
    fn scores(base: &FittedModel, method: CalibrationMethod, x: &Array2<f64>) -> Result<Array1<f64>> {
        let raw = base.predict_probability(x)?;
        if method == CalibrationMethod::Sigmoid && base.has_probability_output() {
            Ok(raw.mapv(|p| {
                let p = p.clamp(1e-12, 1.0 - 1e-12);
                (p / (1.0 - p)).ln()
            }))
        } else {
            Ok(raw)
        }
    }

    pub fn base(&self) -> &FittedModel {
        &self.base
    }

    pub fn method(&self) -> CalibrationMethod {
        self.calibrator.method()
    }

    /// Calibrated positive-class probability
    pub fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = Self::scores(&self.base, self.method(), x)?;
        self.calibrator.inner().calibrate(&scores)
    }

    /// Calibrated probability thresholded at 0.5
    pub fn predict_label(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_probability(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}
