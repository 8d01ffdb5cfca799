//! Error types for shard ingestion.

use std::path::PathBuf;
use thiserror::Error;

use aer_model::ModelError;

/// Errors that can occur while locating, verifying or parsing input files.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("input file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Integrity Errors ===
    /// Compressed input failed the CRC/length pre-check.
    #[error("corrupted compressed input {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Parsing Errors ===
    #[error("failed to parse {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    #[error("input file has no header row: {path}")]
    EmptyCsv { path: PathBuf },

    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// An identifier failed coercion under the `fail` policy.
    #[error("invalid {field} value '{value}' in {path}")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
    },

    // === Worker Pool Errors ===
    #[error("ingestion worker panicked while reading {path}")]
    WorkerPanicked { path: PathBuf },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::MissingColumn {
            column: "safetyreportid".to_string(),
            path: PathBuf::from("/data/report/0001.csv.gzip"),
        };
        assert_eq!(
            err.to_string(),
            "required column 'safetyreportid' not found in /data/report/0001.csv.gzip"
        );
    }
}
