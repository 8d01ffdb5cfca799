//! Error types for the shared data model.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by model types and option loading.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A contract column was requested but the source did not provide it.
    #[error("column '{column}' is not available")]
    FieldUnavailable { column: String },

    /// Two tables could not be combined because their headers differ.
    #[error("table headers do not match: expected {expected:?}, got {actual:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// An identifier failed numeric coercion under the `fail` policy.
    #[error("value '{value}' in {scope} is not a valid integer identifier")]
    CoercionFailed { scope: String, value: String },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An option value is outside its accepted range.
    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::CoercionFailed {
            scope: "drugs.rxcui".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "value 'abc' in drugs.rxcui is not a valid integer identifier"
        );
    }
}
