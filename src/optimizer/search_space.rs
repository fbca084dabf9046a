//! Hyperparameter search spaces
//!
//! A parameter is either a point value, a discrete choice, or a
//! distribution (integer range, uniform/log-uniform float, Beta).

use crate::error::{CrashRiskError, Result};
use rand::prelude::*;
use rand_distr::Beta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Always the same value
    Fixed(ParameterValue),
    /// Uniform pick among values
    Choice(Vec<ParameterValue>),
    /// Integer in `[low, high]`
    Int { low: i64, high: i64 },
    /// Float in `[low, high)`
    Float { low: f64, high: f64, log_scale: bool },
    /// Beta(a, b) on `(0, 1)`
    Beta { a: f64, b: f64 },
}

/// A single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    pub fn fixed(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Fixed(value.into()),
        }
    }

    pub fn choice(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Choice(values),
        }
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    pub fn beta(name: impl Into<String>, a: f64, b: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Beta { a, b },
        }
    }

    /// Draw one value
    pub fn sample(&self, rng: &mut impl Rng) -> Result<ParameterValue> {
        let invalid = |reason: &str| CrashRiskError::InvalidParameter {
            name: self.name.clone(),
            value: format!("{:?}", self.param_type),
            reason: reason.to_string(),
        };

        let value = match &self.param_type {
            ParameterType::Fixed(v) => v.clone(),
            ParameterType::Choice(values) => values
                .choose(rng)
                .cloned()
                .ok_or_else(|| invalid("choice list is empty"))?,
            ParameterType::Int { low, high } => {
                if low > high {
                    return Err(invalid("low exceeds high"));
                }
                ParameterValue::Int(rng.gen_range(*low..=*high))
            }
            ParameterType::Float { low, high, log_scale } => {
                if !(low < high) || (*log_scale && *low <= 0.0) {
                    return Err(invalid("empty or non-positive range"));
                }
                let v = if *log_scale {
                    let (ll, lh) = (low.ln(), high.ln());
                    (rng.gen::<f64>() * (lh - ll) + ll).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(v)
            }
            ParameterType::Beta { a, b } => {
                let dist = Beta::new(*a, *b).map_err(|e| invalid(&e.to_string()))?;
                ParameterValue::Float(dist.sample(rng))
            }
        };
        Ok(value)
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{:.6}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

/// One sampled configuration, ordered by name
pub type TrialParams = BTreeMap<String, ParameterValue>;

/// Typed lookups with defaults for sampled configurations
pub trait TrialParamsExt {
    fn float_or(&self, name: &str, default: f64) -> Result<f64>;
    fn int_or(&self, name: &str, default: i64) -> Result<i64>;
    fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str>;
}

fn wrong_type(name: &str, value: &ParameterValue, expected: &str) -> CrashRiskError {
    CrashRiskError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: format!("expected {}", expected),
    }
}

impl TrialParamsExt for TrialParams {
    fn float_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_float().ok_or_else(|| wrong_type(name, v, "a number")),
        }
    }

    fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_int().ok_or_else(|| wrong_type(name, v, "an integer")),
        }
    }

    fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| wrong_type(name, v, "a string")),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any existing one with the same name
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.retain(|p| p.name != param.name);
        self.parameters.push(param);
        self
    }

    pub fn fixed(self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.add(Parameter::fixed(name, value))
    }

    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    pub fn beta(self, name: impl Into<String>, a: f64, b: f64) -> Self {
        self.add(Parameter::beta(name, a, b))
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> Result<TrialParams> {
        self.parameters
            .iter()
            .map(|p| Ok((p.name.clone(), p.sample(rng)?)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_search_space_builder() {
        let space = SearchSpace::new()
            .fixed("penalty", "l2")
            .beta("c", 5.0, 2.0)
            .int("max_depth", 3, 6)
            .int("max_depth", 2, 4);

        assert_eq!(space.len(), 3);
    }

    #[test]
    fn test_beta_sampling_in_unit_interval() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::beta("learning_rate", 2.0, 15.0);

        let samples: Vec<f64> = (0..200)
            .map(|_| param.sample(&mut rng).unwrap().as_float().unwrap())
            .collect();
        assert!(samples.iter().all(|&v| v > 0.0 && v < 1.0));

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - 2.0 / 17.0).abs() < 0.05, "mean = {}", mean);
    }

    #[test]
    fn test_invalid_beta_is_error() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(Parameter::beta("c", 0.0, 2.0).sample(&mut rng).is_err());
    }

    #[test]
    fn test_int_range_inclusive() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::int("min_child_weight", 1, 4);
        for _ in 0..100 {
            let v = param.sample(&mut rng).unwrap().as_int().unwrap();
            assert!((1..=4).contains(&v));
        }
    }

    #[test]
    fn test_typed_lookup() {
        let mut params = TrialParams::new();
        params.insert("c".into(), ParameterValue::Float(0.7));
        params.insert("penalty".into(), "l2".into());

        assert_eq!(params.float_or("c", 1.0).unwrap(), 0.7);
        assert_eq!(params.float_or("missing", 1.0).unwrap(), 1.0);
        assert_eq!(params.str_or("penalty", "none").unwrap(), "l2");
        assert!(params.int_or("penalty", 3).is_err());
    }
}
