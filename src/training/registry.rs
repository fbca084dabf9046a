//! Model family registry
//!
//! Maps a family name to a constructor taking sampled hyperparameters and
//! to the family's default search space.

use crate::error::{CrashRiskError, Result};
use crate::optimizer::search_space::{SearchSpace, TrialParams, TrialParamsExt};
use crate::training::linear_models::{ClassWeight, LogisticRegression};
use crate::training::models::FittedModel;
use crate::training::svm::{LinearSvm, SvmConfig};
use crate::training::xgboost::{XGBoostClassifier, XGBoostConfig};
use ndarray::Array1;

/// Data-dependent inputs to default search spaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamilyContext {
    /// Negatives per positive in the training target, `n_neg / n_pos`.
    /// Not the inverse positive frequency `N / n_pos`, which is one larger.
    pub scale_pos_weight: f64,
}

impl FamilyContext {
    pub fn from_target(y: &Array1<f64>) -> Self {
        let n_pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
        let n_neg = y.len() as f64 - n_pos;
        let scale_pos_weight = if n_pos > 0.0 && n_neg > 0.0 { n_neg / n_pos } else { 1.0 };
        Self { scale_pos_weight }
    }
}

impl Default for FamilyContext {
    fn default() -> Self {
        Self { scale_pos_weight: 1.0 }
    }
}

type BuildFn = fn(&TrialParams, Option<u64>) -> Result<FittedModel>;
type SpaceFn = fn(&FamilyContext) -> SearchSpace;

/// A named, constructible model family
#[derive(Clone)]
pub struct ModelFamily {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Train on the linear-safe feature list
    pub uses_linear_features: bool,
    build: BuildFn,
    default_space: SpaceFn,
}

impl std::fmt::Debug for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFamily")
            .field("name", &self.name)
            .field("uses_linear_features", &self.uses_linear_features)
            .finish()
    }
}

impl ModelFamily {
    pub fn new(
        name: &'static str,
        aliases: &'static [&'static str],
        uses_linear_features: bool,
        build: BuildFn,
        default_space: SpaceFn,
    ) -> Self {
        Self {
            name,
            aliases,
            uses_linear_features,
            build,
            default_space,
        }
    }

    /// Unfitted model configured from `params`
    pub fn build(&self, params: &TrialParams, seed: Option<u64>) -> Result<FittedModel> {
        (self.build)(params, seed)
    }

    pub fn default_space(&self, ctx: &FamilyContext) -> SearchSpace {
        (self.default_space)(ctx)
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

fn build_logistic(params: &TrialParams, _seed: Option<u64>) -> Result<FittedModel> {
    let penalty = params.str_or("penalty", "l2")?;
    if penalty != "l2" {
        return Err(CrashRiskError::InvalidParameter {
            name: "penalty".to_string(),
            value: penalty.to_string(),
            reason: "only 'l2' is supported".to_string(),
        });
    }
    let model = LogisticRegression::new()
        .with_c(params.float_or("c", 1.0)?)
        .with_class_weight(params.str_or("class_weight", "none")?.parse()?)
        .with_max_iter(params.int_or("max_iter", 100)?.max(1) as usize);
    Ok(FittedModel::LogisticRegression(model))
}

fn logistic_space(_ctx: &FamilyContext) -> SearchSpace {
    SearchSpace::new()
        .fixed("penalty", "l2")
        .beta("c", 5.0, 2.0)
        .fixed("class_weight", "balanced")
}

fn build_xgboost(params: &TrialParams, seed: Option<u64>) -> Result<FittedModel> {
    let defaults = XGBoostConfig::default();
    let config = XGBoostConfig {
        n_estimators: params.int_or("n_estimators", defaults.n_estimators as i64)?.max(1) as usize,
        learning_rate: params.float_or("learning_rate", defaults.learning_rate)?,
        max_depth: params.int_or("max_depth", defaults.max_depth as i64)?.max(1) as usize,
        min_child_weight: params.float_or("min_child_weight", defaults.min_child_weight)?,
        scale_pos_weight: params.float_or("scale_pos_weight", defaults.scale_pos_weight)?,
        reg_lambda: params.float_or("reg_lambda", defaults.reg_lambda)?,
        gamma: params.float_or("gamma", defaults.gamma)?,
        subsample: params.float_or("subsample", defaults.subsample)?,
        colsample_bytree: params.float_or("colsample_bytree", defaults.colsample_bytree)?,
        random_state: seed.or(defaults.random_state),
    };
    Ok(FittedModel::Xgboost(XGBoostClassifier::new(config)))
}

fn xgboost_space(ctx: &FamilyContext) -> SearchSpace {
    SearchSpace::new()
        .int("max_depth", 3, 6)
        .int("min_child_weight", 1, 4)
        .beta("learning_rate", 2.0, 15.0)
        .fixed("scale_pos_weight", ctx.scale_pos_weight)
}

fn build_linear_svm(params: &TrialParams, seed: Option<u64>) -> Result<FittedModel> {
    let defaults = SvmConfig::default();
    let config = SvmConfig {
        c: params.float_or("c", defaults.c)?,
        class_weight: params.str_or("class_weight", "none")?.parse::<ClassWeight>()?,
        max_iter: params.int_or("max_iter", defaults.max_iter as i64)?.max(1) as usize,
        random_state: seed.or(defaults.random_state),
        ..defaults
    };
    Ok(FittedModel::LinearSvm(LinearSvm::new(config)))
}

fn linear_svm_space(_ctx: &FamilyContext) -> SearchSpace {
    SearchSpace::new()
        .beta("c", 5.0, 2.0)
        .fixed("class_weight", "balanced")
}

/// Registry of the supported model families
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    families: Vec<ModelFamily>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ModelRegistry {
    /// Registry with logistic regression, boosted trees and linear SVM
    pub fn standard() -> Self {
        Self {
            families: vec![
                ModelFamily::new(
                    "logistic_regression",
                    &["LogisticRegression", "LR_base"],
                    true,
                    build_logistic,
                    logistic_space,
                ),
                ModelFamily::new(
                    "xgboost",
                    &["XGBClassifier", "XG_base"],
                    false,
                    build_xgboost,
                    xgboost_space,
                ),
                ModelFamily::new(
                    "linear_svm",
                    &["LinearSVC"],
                    true,
                    build_linear_svm,
                    linear_svm_space,
                ),
            ],
        }
    }

    /// Add or replace a family
    pub fn register(&mut self, family: ModelFamily) {
        self.families.retain(|f| f.name != family.name);
        self.families.push(family);
    }

    /// Resolve a family by name or alias
    pub fn get(&self, name: &str) -> Result<&ModelFamily> {
        self.families
            .iter()
            .find(|f| f.matches(name))
            .ok_or_else(|| CrashRiskError::UnknownModel(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.families.iter().map(|f| f.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::search_space::ParameterValue;
    use ndarray::array;

    #[test]
    fn test_resolve_by_name_and_alias() {
        let registry = ModelRegistry::standard();
        assert_eq!(registry.get("xgboost").unwrap().name, "xgboost");
        assert_eq!(registry.get("XGBClassifier").unwrap().name, "xgboost");
        assert!(registry.get("LogisticRegression").unwrap().uses_linear_features);
    }

    #[test]
    fn test_unknown_family() {
        let err = ModelRegistry::standard().get("random_forest").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("random_forest"));
    }

    #[test]
    fn test_scale_pos_weight_from_target() {
        let ctx = FamilyContext::from_target(&array![1.0, 0.0, 0.0, 0.0]);
        assert!((ctx.scale_pos_weight - 3.0).abs() < 1e-12);

        let space = ModelRegistry::standard().get("xgboost").unwrap().default_space(&ctx);
        assert_eq!(space.len(), 4);
    }

    #[test]
    fn test_build_rejects_l1() {
        let mut params = TrialParams::new();
        params.insert("penalty".into(), ParameterValue::from("l1"));
        let family = ModelRegistry::standard();
        assert!(family.get("logistic_regression").unwrap().build(&params, None).is_err());
    }

    #[test]
    fn test_build_xgboost_from_params() {
        let mut params = TrialParams::new();
        params.insert("max_depth".into(), ParameterValue::Int(3));
        params.insert("learning_rate".into(), ParameterValue::Float(0.1));
        let model = ModelRegistry::standard()
            .get("xgboost")
            .unwrap()
            .build(&params, Some(1))
            .unwrap();
        match model {
            FittedModel::Xgboost(m) => {
                assert_eq!(m.config().max_depth, 3);
                assert_eq!(m.config().random_state, Some(1));
            }
            other => panic!("unexpected model {:?}", other),
        }
    }
}
