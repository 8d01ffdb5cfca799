//! Error types for vocabulary loading and resolution.

use std::path::PathBuf;
use thiserror::Error;

use aer_ingest::IngestError;
use aer_model::ModelError;

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("vocabulary directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// `CONCEPT` or `CONCEPT_RELATIONSHIP` is absent; nothing is loaded.
    #[error("required vocabulary table {table} not found under {dir}")]
    MissingTable { table: String, dir: PathBuf },

    #[error("invalid hierarchy levels: {reason}")]
    InvalidLevels { reason: String },

    #[error("failed to write snapshot {path}: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read snapshot {path}: {source}")]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot {path}: {source}")]
    SnapshotFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, VocabError>;
