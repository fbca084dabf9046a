//! Feature specification and expansion
//!
//! Categorical columns become `name_value` indicator columns, continuous
//! columns gain a `log_name` column holding `ln(x + 1)`.

use crate::error::{CrashRiskError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Ordered continuous and categorical feature names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub continuous: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeatureSpec {
    pub fn new<S: Into<String>>(
        continuous: impl IntoIterator<Item = S>,
        categorical: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            continuous: continuous.into_iter().map(Into::into).collect(),
            categorical: categorical.into_iter().map(Into::into).collect(),
        }
    }

    /// Keep only the features present in `df`; absent ones are logged and dropped
    pub fn resolve(&self, df: &DataFrame) -> FeatureSpec {
        let present: HashSet<&str> = df.get_column_names().into_iter().map(|c| c.as_str()).collect();

        let keep = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter(|name| {
                    let found = present.contains(name.as_str());
                    if !found {
                        warn!(feature = %name, "feature not found in dataset, skipping");
                    }
                    found
                })
                .cloned()
                .collect()
        };

        FeatureSpec {
            continuous: keep(&self.continuous),
            categorical: keep(&self.categorical),
        }
    }

    /// Raw (pre-expansion) names, continuous first
    pub fn raw_names(&self) -> Vec<String> {
        self.continuous.iter().chain(self.categorical.iter()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.continuous.is_empty() && self.categorical.is_empty()
    }
}

/// Expanded table plus the two feature lists derived from it
#[derive(Debug, Clone)]
pub struct ProcessedFeatures {
    pub frame: DataFrame,
    /// All indicator and log columns, for tree ensembles
    pub features: Vec<String>,
    /// First indicator level per category dropped, for linear models
    pub linear_features: Vec<String>,
}

/// `ln(x + 1)`, rejecting inputs whose shifted value is not positive
pub fn log_transform(x: f64) -> Result<f64> {
    let shifted = x + 1.0;
    if shifted.is_nan() || shifted <= 0.0 {
        return Err(CrashRiskError::ValidationError(format!(
            "log(x + 1) is undefined for x = {}",
            x
        )));
    }
    Ok(shifted.ln())
}

/// Sort category levels numerically when every level parses as a number,
/// lexicographically otherwise
pub fn sort_levels(levels: &mut [String]) {
    let as_number = |l: &str| l.trim().parse::<f64>().ok();
    if levels.iter().all(|l| as_number(l).is_some()) {
        levels.sort_by(|a, b| {
            as_number(a)
                .partial_cmp(&as_number(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        levels.sort();
    }
}

/// Indicator column name for one category level
pub fn indicator_name(feature: &str, level: &str) -> String {
    format!("{}_{}", feature, level)
}

/// Log column name for a continuous feature
pub fn log_name(feature: &str) -> String {
    format!("log_{}", feature)
}

/// One-hot and log expansion of a [`FeatureSpec`]
#[derive(Debug, Clone, Default)]
pub struct FeatureProcessor;

impl FeatureProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Expand `df` according to `spec`; original columns stay in the frame
    pub fn process(&self, mut df: DataFrame, spec: &FeatureSpec) -> Result<ProcessedFeatures> {
        let mut features = Vec::new();
        let mut linear_features = Vec::new();

        for name in &spec.categorical {
            let (indicators, names) = Self::one_hot(&df, name)?;
            for series in indicators {
                df.with_column(series)?;
            }
            linear_features.extend(names.iter().skip(1).cloned());
            features.extend(names);
        }

        for name in &spec.continuous {
            let series = Self::log_column(&df, name)?;
            let log_col = series.name().to_string();
            df.with_column(series)?;
            features.push(log_col.clone());
            linear_features.push(log_col);
        }

        let raw: HashSet<String> = spec.raw_names().into_iter().collect();
        let features = dedup_against(features, &raw);
        let linear_features = dedup_against(linear_features, &raw);

        debug!(
            n_features = features.len(),
            n_linear = linear_features.len(),
            "expanded features"
        );

        Ok(ProcessedFeatures {
            frame: df,
            features,
            linear_features,
        })
    }

    fn one_hot(df: &DataFrame, name: &str) -> Result<(Vec<Series>, Vec<String>)> {
        let column = df
            .column(name)
            .map_err(|_| CrashRiskError::FeatureNotFound(name.to_string()))?
            .cast(&DataType::String)?;
        let values = column.str()?;

        let mut levels: Vec<String> = values
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sort_levels(&mut levels);

        let mut series = Vec::with_capacity(levels.len());
        let mut names = Vec::with_capacity(levels.len());
        for level in &levels {
            let col_name = indicator_name(name, level);
            let indicator: Vec<i32> = values
                .into_iter()
                .map(|v| i32::from(v == Some(level.as_str())))
                .collect();
            series.push(Series::new(col_name.as_str().into(), indicator));
            names.push(col_name);
        }
        Ok((series, names))
    }

    fn log_column(df: &DataFrame, name: &str) -> Result<Series> {
        let column = df
            .column(name)
            .map_err(|_| CrashRiskError::FeatureNotFound(name.to_string()))?
            .cast(&DataType::Float64)?;

        let transformed: Vec<Option<f64>> = column
            .f64()?
            .into_iter()
            .map(|v| v.map(log_transform).transpose())
            .collect::<Result<_>>()
            .map_err(|e| CrashRiskError::ValidationError(format!("column '{}': {}", name, e)))?;

        Ok(Series::new(log_name(name).as_str().into(), transformed))
    }
}

fn dedup_against(names: Vec<String>, raw: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| !raw.contains(n) && seen.insert(n.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> DataFrame {
        df!(
            "hwy_type" => &[2i64, 10, 1, 2, 10],
            "width" => &[0.0, 3.0, 7.0, 1.5, 20.0],
            "TARGET" => &[0i64, 1, 0, 0, 1]
        )
        .unwrap()
    }

    #[test]
    fn test_log_transform_domain() {
        assert_eq!(log_transform(0.0).unwrap(), 0.0);
        assert!((log_transform(std::f64::consts::E - 1.0).unwrap() - 1.0).abs() < 1e-12);
        assert!(log_transform(-0.5).is_ok());
        assert!(log_transform(-2.0).is_err());
        assert!(log_transform(-1.0).is_err());
    }

    #[test]
    fn test_numeric_levels_sort_numerically() {
        let mut levels = vec!["10".to_string(), "2".to_string(), "1".to_string()];
        sort_levels(&mut levels);
        assert_eq!(levels, vec!["1", "2", "10"]);

        let mut levels = vec!["b".to_string(), "10".to_string(), "a".to_string()];
        sort_levels(&mut levels);
        assert_eq!(levels, vec!["10", "a", "b"]);
    }

    #[test]
    fn test_resolve_drops_missing() {
        let spec = FeatureSpec::new(vec!["width", "AADT"], vec!["hwy_type", "signal"]);
        let resolved = spec.resolve(&segments());
        assert_eq!(resolved.continuous, vec!["width"]);
        assert_eq!(resolved.categorical, vec!["hwy_type"]);
    }

    #[test]
    fn test_process_feature_lists() {
        let spec = FeatureSpec::new(vec!["width"], vec!["hwy_type"]);
        let processed = FeatureProcessor::new().process(segments(), &spec).unwrap();

        assert_eq!(
            processed.features,
            vec!["hwy_type_1", "hwy_type_2", "hwy_type_10", "log_width"]
        );
        assert_eq!(processed.linear_features, vec!["hwy_type_2", "hwy_type_10", "log_width"]);
        assert!(processed.frame.column("hwy_type").is_ok());
        assert!(processed.frame.column("width").is_ok());
    }

    #[test]
    fn test_negative_continuous_fails() {
        let df = df!("width" => &[1.0, -3.0]).unwrap();
        let spec = FeatureSpec::new(vec!["width"], Vec::<&str>::new());
        let err = FeatureProcessor::new().process(df, &spec).unwrap_err();
        assert!(matches!(err, CrashRiskError::ValidationError(_)));
    }

    #[test]
    fn test_null_continuous_stays_null() {
        let df = df!("width" => &[Some(0.0), None]).unwrap();
        let spec = FeatureSpec::new(vec!["width"], Vec::<&str>::new());
        let processed = FeatureProcessor::new().process(df, &spec).unwrap();
        let logs = processed.frame.column("log_width").unwrap().f64().unwrap().clone();
        assert_eq!(logs.get(0), Some(0.0));
        assert_eq!(logs.get(1), None);
    }
}
