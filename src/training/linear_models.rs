//! L2-regularized logistic regression fitted by Newton iterations

use crate::error::{CrashRiskError, Result};
use crate::training::models::{check_width, check_xy, Classifier, FeatureWeights};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a small ridge if the matrix is not positive definite.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    cholesky_solve_inner(a, b).or_else(|| {
        let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64 + 1e-12;
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += ridge;
        }
        cholesky_solve_inner(&a_reg, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Per-class sample weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample weighs 1
    Uniform,
    /// Weight `n / (2 * n_class)` so both classes contribute equally
    Balanced,
}

impl ClassWeight {
    /// Per-sample weights for a binary target
    pub fn sample_weights(&self, y: &Array1<f64>) -> Array1<f64> {
        match self {
            ClassWeight::Uniform => Array1::ones(y.len()),
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let n_pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
                let n_neg = n - n_pos;
                let w_pos = if n_pos > 0.0 { n / (2.0 * n_pos) } else { 0.0 };
                let w_neg = if n_neg > 0.0 { n / (2.0 * n_neg) } else { 0.0 };
                y.mapv(|v| if v > 0.5 { w_pos } else { w_neg })
            }
        }
    }
}

impl std::str::FromStr for ClassWeight {
    type Err = CrashRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "balanced" => Ok(ClassWeight::Balanced),
            "none" | "uniform" => Ok(ClassWeight::Uniform),
            other => Err(CrashRiskError::InvalidParameter {
                name: "class_weight".to_string(),
                value: other.to_string(),
                reason: "expected 'balanced' or 'none'".to_string(),
            }),
        }
    }
}

/// Logistic regression for binary classification
///
/// Minimizes `0.5 * ||w||^2 + c * sum_i s_i * logloss_i`, with `s_i` the
/// class weight of sample `i`. The intercept is not penalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub class_weight: ClassWeight,
    pub fit_intercept: bool,
    pub max_iter: usize,
    pub tol: f64,
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            class_weight: ClassWeight::Uniform,
            fit_intercept: true,
            max_iter: 100,
            tol: 1e-6,
            coefficients: None,
            intercept: None,
            is_fitted: false,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    /// Design matrix with a trailing column of ones when fitting an intercept
    fn augment(&self, x: &Array2<f64>) -> Array2<f64> {
        if !self.fit_intercept {
            return x.to_owned();
        }
        let mut aug = Array2::ones((x.nrows(), x.ncols() + 1));
        aug.slice_mut(ndarray::s![.., ..x.ncols()]).assign(x);
        aug
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        if !(self.c > 0.0) {
            return Err(CrashRiskError::InvalidParameter {
                name: "c".to_string(),
                value: self.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let n_features = x.ncols();
        let xa = self.augment(x);
        let dim = xa.ncols();
        let sample_w = self.class_weight.sample_weights(y) * self.c;
        let reg = Array1::from_shape_fn(dim, |j| if j < n_features { 1.0 } else { 1e-10 });

        let mut w = Array1::<f64>::zeros(dim);
        for _ in 0..self.max_iter {
            let p = xa.dot(&w).mapv(Self::sigmoid);

            let residual = &sample_w * &(&p - y);
            let grad = xa.t().dot(&residual) + &reg * &w;

            let curvature = &sample_w * &p.mapv(|v| (v * (1.0 - v)).max(1e-12));
            let weighted = &xa * &curvature.view().insert_axis(Axis(1));
            let mut hess = xa.t().dot(&weighted);
            for j in 0..dim {
                hess[[j, j]] += reg[j];
            }

            let step = cholesky_solve(&hess, &grad).ok_or_else(|| {
                CrashRiskError::ComputationError("singular Hessian in logistic regression".to_string())
            })?;
            w = w - &step;

            if step.iter().fold(0.0f64, |m, v| m.max(v.abs())) < self.tol {
                break;
            }
        }

        if w.iter().any(|v| !v.is_finite()) {
            return Err(CrashRiskError::ComputationError(
                "logistic regression diverged".to_string(),
            ));
        }

        self.intercept = Some(if self.fit_intercept { w[n_features] } else { 0.0 });
        self.coefficients = Some(w.slice(ndarray::s![..n_features]).to_owned());
        self.is_fitted = true;
        Ok(self)
    }

    /// Predict positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(CrashRiskError::ModelNotFitted)?;
        check_width(x, coefficients.len())?;
        let intercept = self.intercept.unwrap_or(0.0);
        Ok((x.dot(coefficients) + intercept).mapv(Self::sigmoid))
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn feature_weights(&self) -> Option<FeatureWeights> {
        self.coefficients
            .as_ref()
            .map(|c| FeatureWeights::Coefficients(c.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn noisy_threshold() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 / 4.0 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(40, |i| if i >= 20 || i == 5 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = cholesky_solve(&a, &b).unwrap();
        let back = a.dot(&x);
        assert!((back[0] - 1.0).abs() < 1e-10 && (back[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_logistic_separates() {
        let (x, y) = noisy_threshold();
        let mut model = LogisticRegression::new().with_c(1.0);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(proba[39] > 0.8, "p = {}", proba[39]);
        assert!(proba[0] < 0.2, "p = {}", proba[0]);
    }

    #[test]
    fn test_stronger_regularization_shrinks_coefficients() {
        let (x, y) = noisy_threshold();
        let mut loose = LogisticRegression::new().with_c(10.0);
        let mut tight = LogisticRegression::new().with_c(0.01);
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();

        let norm = |m: &LogisticRegression| m.coefficients.as_ref().unwrap().mapv(|v| v * v).sum();
        assert!(norm(&tight) < norm(&loose));
    }

    #[test]
    fn test_balanced_weights_sum_to_n() {
        let y = array![1.0, 0.0, 0.0, 0.0];
        let w = ClassWeight::Balanced.sample_weights(&y);
        assert!((w.sum() - 4.0).abs() < 1e-12);
        assert!((w[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        let err = model.predict_proba(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, CrashRiskError::ModelNotFitted));
    }

    #[test]
    fn test_coefficients_exposed() {
        let (x, y) = noisy_threshold();
        let mut model = LogisticRegression::new().with_class_weight(ClassWeight::Balanced);
        Classifier::fit(&mut model, &x, &y).unwrap();
        match model.feature_weights() {
            Some(FeatureWeights::Coefficients(c)) => assert_eq!(c.len(), 2),
            other => panic!("unexpected weights: {:?}", other),
        }
    }
}
