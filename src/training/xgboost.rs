//! Gradient-boosted trees with second-order split scoring
//!
//! - leaf weight `w* = -G / (H + lambda)`
//! - split gain `0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)]`, kept when above `gamma`
//! - children must carry at least `min_child_weight` hessian mass
//! - positive samples scaled by `scale_pos_weight` in the logistic loss

use crate::error::{CrashRiskError, Result};
use crate::training::models::{check_width, check_xy, Classifier, FeatureWeights};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// Weight multiplier on positive-class gradients
    pub scale_pos_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            scale_pos_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf { weight: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { weight } => *weight,
            TreeNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut [f64]) {
        if let TreeNode::Split { feature, left, right, .. } = self {
            if let Some(c) = counts.get_mut(*feature) {
                *c += 1.0;
            }
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

struct Gradients<'a> {
    x: &'a Array2<f64>,
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
}

fn build_tree(
    data: &Gradients<'_>,
    indices: &[usize],
    feature_indices: &[usize],
    depth: usize,
    config: &XGBoostConfig,
) -> TreeNode {
    let g_sum: f64 = indices.iter().map(|&i| data.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| data.hess[i]).sum();
    let leaf = TreeNode::Leaf {
        weight: -g_sum / (h_sum + config.reg_lambda),
    };

    if depth >= config.max_depth || indices.len() < 2 || h_sum < config.min_child_weight {
        return leaf;
    }

    let best = feature_indices
        .par_iter()
        .filter_map(|&f| best_split_for_feature(data, indices, f, config))
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((feature, threshold, gain)) if gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| data.x[[i, feature]] <= threshold);
            if left_idx.is_empty() || right_idx.is_empty() {
                return leaf;
            }
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(build_tree(data, &left_idx, feature_indices, depth + 1, config)),
                right: Box::new(build_tree(data, &right_idx, feature_indices, depth + 1, config)),
            }
        }
        _ => leaf,
    }
}

/// Exact greedy search over one feature: `(feature, threshold, gain)`
fn best_split_for_feature(
    data: &Gradients<'_>,
    indices: &[usize],
    feature: usize,
    config: &XGBoostConfig,
) -> Option<(usize, f64, f64)> {
    let x = data.x;
    let mut sorted: Vec<usize> = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let g_total: f64 = sorted.iter().map(|&i| data.grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| data.hess[i]).sum();
    let lambda = config.reg_lambda;

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for pos in 0..sorted.len().saturating_sub(1) {
        let idx = sorted[pos];
        let next = sorted[pos + 1];
        g_left += data.grad[idx];
        h_left += data.hess[idx];

        if (x[[idx, feature]] - x[[next, feature]]).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                - g_total * g_total / (h_total + lambda));

        if best.map_or(true, |(_, g)| gain > g) {
            best = Some(((x[[idx, feature]] + x[[next, feature]]) / 2.0, gain));
        }
    }

    best.map(|(threshold, gain)| (feature, threshold, gain))
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

/// Boosted-tree binary classifier (logistic loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostClassifier {
    config: XGBoostConfig,
    trees: Vec<TreeNode>,
    base_score: f64,
    n_features: usize,
}

impl XGBoostClassifier {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &XGBoostConfig {
        &self.config
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        let bad = |name: &str, value: f64, reason: &str| CrashRiskError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        if !(c.learning_rate > 0.0) {
            return Err(bad("learning_rate", c.learning_rate, "must be positive"));
        }
        if !(c.scale_pos_weight > 0.0) {
            return Err(bad("scale_pos_weight", c.scale_pos_weight, "must be positive"));
        }
        if c.min_child_weight < 0.0 {
            return Err(bad("min_child_weight", c.min_child_weight, "must be non-negative"));
        }
        Ok(())
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;

        let p = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
        self.base_score = (p / (1.0 - p)).ln();
        let mut raw = Array1::from_elem(n_samples, self.base_score);

        let sample_w = y.mapv(|v| if v > 0.5 { self.config.scale_pos_weight } else { 1.0 });

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();
        for _ in 0..self.config.n_estimators {
            let probs = raw.mapv(Self::sigmoid);
            let grad = (&probs - y) * &sample_w;
            let hess = probs.mapv(|p| (p * (1.0 - p)).max(1e-7)) * &sample_w;

            let rows = subsample(&mut rng, n_samples, self.config.subsample);
            let cols = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let data = Gradients { x, grad: &grad, hess: &hess };
            let tree = build_tree(&data, &rows, &cols, 0, &self.config);

            for (i, row) in x.outer_iter().enumerate() {
                raw[i] += self.config.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }

        Ok(())
    }

    /// Raw additive score in log-odds space
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(CrashRiskError::ModelNotFitted);
        }
        check_width(x, self.n_features)?;
        let lr = self.config.learning_rate;
        Ok(x
            .outer_iter()
            .map(|row| {
                self.base_score + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(Self::sigmoid))
    }

    /// Split-count importances normalized to sum to one
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            counts.iter_mut().for_each(|c| *c /= total);
        }
        Some(Array1::from_vec(counts))
    }
}

impl Classifier for XGBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        XGBoostClassifier::fit(self, x, y)
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn feature_weights(&self) -> Option<FeatureWeights> {
        self.feature_importances()
            .map(|v| FeatureWeights::Importances(v.to_vec()))
    }
}
