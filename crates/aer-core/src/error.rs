//! Error types for pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

use aer_ingest::IngestError;
use aer_join::JoinError;
use aer_model::ModelError;
use aer_report::ReportError;
use aer_vocab::VocabError;

#[derive(Debug, Error)]
pub enum CoreError {
    // === Configuration Errors ===
    #[error("no vocabulary directory configured")]
    MissingVocabDir,

    /// A stage input produced by an earlier stage does not exist.
    #[error("{stage} needs {path}; run the earlier stages first")]
    MissingInput { stage: &'static str, path: PathBuf },

    #[error("no tabular shard files in {path}")]
    EmptySource { path: PathBuf },

    // === Component Errors ===
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Vocab(#[from] VocabError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
