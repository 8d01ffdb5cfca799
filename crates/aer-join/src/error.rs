//! Error types for the key index and the streaming join.

use std::path::PathBuf;
use thiserror::Error;

use aer_ingest::IngestError;
use aer_model::ModelError;

#[derive(Debug, Error)]
pub enum JoinError {
    // === Index Errors ===
    #[error("failed to create join index {path}: {source}")]
    IndexCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("join index {operation} failed: {source}")]
    Index {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("corrupt row payload in join index: {source}")]
    Payload {
        #[source]
        source: serde_json::Error,
    },

    // === Input Errors ===
    #[error("a join needs at least one input")]
    NoInputs,

    #[error("key column '{column}' not found in join input {input}")]
    MissingKeyColumn { input: String, column: String },

    /// Two inputs contribute the same output column after prefixing.
    #[error("duplicate output column '{column}'")]
    DuplicateColumn { column: String },

    // === Output Errors ===
    #[error("failed to write joined rows: {source}")]
    Sink {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl JoinError {
    pub(crate) fn index(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| JoinError::Index { operation, source }
    }

    /// Wraps an error raised by a row sink.
    pub fn sink<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        JoinError::Sink {
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, JoinError>;
