//! Randomized cross-validated hyperparameter search
//!
//! Each trial samples one parameter combination and scores it on every
//! fold. Folds are fitted in parallel and combined in fold order. The tuner
//! never refits on the full training set; that is left to the caller once a
//! family has been selected.

use crate::error::Result;
use crate::evaluation::metrics::Metric;
use crate::optimizer::config::CvConfig;
use crate::optimizer::search_space::{SearchSpace, TrialParams};
use crate::training::cross_validation::{ensure_both_classes, CVResults, CVSplit, CrossValidator};
use crate::training::models::Classifier;
use crate::training::registry::{FamilyContext, ModelFamily, ModelRegistry};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One sampled parameter combination and its cross-validated scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub params: TrialParams,
    pub mean_train_score: f64,
    pub mean_test_score: f64,
    pub std_test_score: f64,
}

/// Outcome of tuning one model family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub family: String,
    /// Features the family was tuned on, in matrix column order
    pub features: Vec<String>,
    pub metric: Metric,
    pub best_params: TrialParams,
    pub best_score: f64,
    pub trials: Vec<TrialRecord>,
}

/// Randomized-search tuner over the families of a [`ModelRegistry`]
#[derive(Debug, Clone)]
pub struct Tuner {
    registry: ModelRegistry,
    cv: CvConfig,
    random_state: Option<u64>,
}

impl Tuner {
    pub fn new(registry: ModelRegistry, cv: CvConfig) -> Self {
        Self {
            registry,
            cv,
            random_state: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn cv_config(&self) -> &CvConfig {
        &self.cv
    }

    /// Tune `family_name` on `x` (columns named by `features`) and `y`.
    ///
    /// `space` overrides the family's default search space. Fails with
    /// `UnknownModel` for unregistered names and with
    /// `InsufficientClassBalance` when any fold holds a single class.
    pub fn tune(
        &self,
        family_name: &str,
        features: &[String],
        x: &Array2<f64>,
        y: &Array1<f64>,
        space: Option<SearchSpace>,
    ) -> Result<TuningResult> {
        self.cv.validate()?;
        let family = self.registry.get(family_name)?;
        let space = space.unwrap_or_else(|| family.default_space(&FamilyContext::from_target(y)));

        let mut rng = match self.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let folds = CrossValidator::new(self.cv.strategy())
            .with_random_state(rng.gen())
            .split(y)?;
        for fold in &folds {
            ensure_both_classes(y, fold, family.name)?;
        }

        info!(
            family = family.name,
            iterations = self.cv.iterations,
            folds = folds.len(),
            metric = %self.cv.metric,
            "Tuning model family"
        );

        let mut trials: Vec<TrialRecord> = Vec::with_capacity(self.cv.iterations);
        let mut best: Option<usize> = None;

        for trial in 0..self.cv.iterations {
            let params = space.sample(&mut rng)?;
            let model_seed = self.random_state.map(|_| rng.gen::<u64>());

            let fold_scores: Vec<(f64, f64)> = folds
                .par_iter()
                .map(|fold| self.score_fold(family, &params, model_seed, x, y, fold))
                .collect::<Result<Vec<_>>>()?;

            let train = CVResults::from_scores(fold_scores.iter().map(|s| s.0).collect());
            let test = CVResults::from_scores(fold_scores.iter().map(|s| s.1).collect());
            debug!(
                family = family.name,
                trial,
                mean_train = train.mean_score,
                mean_test = test.mean_score,
                "Trial scored"
            );

            let record = TrialRecord {
                params,
                mean_train_score: train.mean_score,
                mean_test_score: test.mean_score,
                std_test_score: test.std_score,
            };
            let improves = match best {
                Some(b) => record.mean_test_score > trials[b].mean_test_score,
                None => true,
            };
            trials.push(record);
            if improves {
                best = Some(trials.len() - 1);
            }
        }

        let best_trial = best.map(|b| &trials[b]);
        let best_params = best_trial.map(|t| t.params.clone()).unwrap_or_default();
        let best_score = best_trial.map(|t| t.mean_test_score).unwrap_or(f64::NAN);
        info!(family = family.name, best_score, "Tuning finished");

        Ok(TuningResult {
            family: family.name.to_string(),
            features: features.to_vec(),
            metric: self.cv.metric,
            best_params,
            best_score,
            trials,
        })
    }

    /// Fit on the fold's training rows; score both sides
    fn score_fold(
        &self,
        family: &ModelFamily,
        params: &TrialParams,
        seed: Option<u64>,
        x: &Array2<f64>,
        y: &Array1<f64>,
        fold: &CVSplit,
    ) -> Result<(f64, f64)> {
        let x_train = x.select(Axis(0), &fold.train_indices);
        let y_train = y.select(Axis(0), &fold.train_indices);
        let x_test = x.select(Axis(0), &fold.test_indices);
        let y_test = y.select(Axis(0), &fold.test_indices);

        let mut model = family.build(params, seed)?;
        model.fit(&x_train, &y_train)?;

        let metric = self.cv.metric;
        let train_score = metric.score(&y_train, &model.predict_probability(&x_train)?)?;
        let test_score = metric.score(&y_test, &model.predict_probability(&x_test)?)?;
        Ok((train_score, test_score))
    }
}
