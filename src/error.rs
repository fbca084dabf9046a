//! Error types for crash risk training and scoring

use thiserror::Error;

/// Result type alias for crash risk operations
pub type Result<T> = std::result::Result<T, CrashRiskError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum CrashRiskError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: unknown model family '{0}'")]
    UnknownModel(String),

    #[error("Configuration error: target column '{column}' has {distinct} distinct value(s), at least 2 are required")]
    DegenerateTarget { column: String, distinct: usize },

    #[error(
        "Insufficient class balance for cross-validation: fold {fold} of '{family}' holds a single class; \
         retry with fewer folds or at a coarser aggregation level"
    )]
    InsufficientClassBalance { family: String, fold: usize },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CrashRiskError {
    /// Fatal misconfiguration: bad target, unknown family, malformed feature spec
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CrashRiskError::ConfigError(_)
                | CrashRiskError::UnknownModel(_)
                | CrashRiskError::DegenerateTarget { .. }
        )
    }

    /// A cross-validation fold saw only one class
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, CrashRiskError::InsufficientClassBalance { .. })
    }
}

impl From<polars::error::PolarsError> for CrashRiskError {
    fn from(err: polars::error::PolarsError) -> Self {
        CrashRiskError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for CrashRiskError {
    fn from(err: serde_json::Error) -> Self {
        CrashRiskError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CrashRiskError {
    fn from(err: serde_yaml::Error) -> Self {
        CrashRiskError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CrashRiskError {
    fn from(err: ndarray::ShapeError) -> Self {
        CrashRiskError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_reads_as_configuration_error() {
        let err = CrashRiskError::UnknownModel("RF_base".to_string());
        assert!(err.is_configuration());
        assert!(!err.is_insufficient_data());
        let msg = err.to_string();
        assert!(msg.starts_with("Configuration error"));
        assert!(msg.contains("RF_base"));
    }

    #[test]
    fn test_insufficient_balance_names_family() {
        let err = CrashRiskError::InsufficientClassBalance {
            family: "xgboost".to_string(),
            fold: 3,
        };
        assert!(err.is_insufficient_data());
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("xgboost"));
    }
}
