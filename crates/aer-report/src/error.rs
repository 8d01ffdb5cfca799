//! Error types for table and statistics output.

use std::path::PathBuf;
use thiserror::Error;

use aer_model::ModelError;

#[derive(Debug, Error)]
pub enum ReportError {
    // === File System Errors ===
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Encoding Errors ===
    #[error("failed to encode {path}: {source}")]
    Frame {
        path: PathBuf,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("failed to serialize statistics {path}: {source}")]
    Stats {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A chunk does not carry exactly the columns the writer was created with.
    #[error("chunk columns {actual:?} do not match {path} columns {expected:?}")]
    ColumnMismatch {
        path: PathBuf,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, ReportError>;
