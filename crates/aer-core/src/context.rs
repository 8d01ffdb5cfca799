//! Pipeline context shared by every stage.
//!
//! The context carries the input and output roots and the run options. There
//! is no other shared state: each stage reads what earlier stages wrote under
//! the output root and passes loaded vocabularies and snapshots explicitly.

use std::path::{Path, PathBuf};

use aer_ingest::{ReadOptions, ShardReader};
use aer_join::JoinSpec;
use aer_model::{ColumnContract, PipelineOptions, REPORT_KEY_COLUMN, Table};
use aer_vocab::{LoadOptions, VocabularyStore};

use crate::error::{CoreError, Result};

pub const ER_TABLES_DIR: &str = "er_tables";
pub const STANDARD_DIR: &str = "standard";
pub const BASELINE_DIR: &str = "baseline";
pub const PROCESSED_DIR: &str = "processed";
pub const QA_DIR: &str = "qa";
pub const STATS_DIR: &str = "stats";
pub const WORK_DIR: &str = ".work";

/// Input root, output root and options of one run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Directory holding the raw shard directories (`report/`, `patient/`, ...).
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub options: PipelineOptions,
}

impl PipelineContext {
    pub fn new(data_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            out_dir: out_dir.into(),
            options: PipelineOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_vocab_dir(mut self, vocab_dir: impl Into<PathBuf>) -> Self {
        self.options.vocab_dir = Some(vocab_dir.into());
        self
    }

    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn er_dir(&self) -> PathBuf {
        self.out_dir.join(ER_TABLES_DIR)
    }

    pub fn standard_dir(&self) -> PathBuf {
        self.out_dir.join(STANDARD_DIR)
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.out_dir.join(BASELINE_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.out_dir.join(PROCESSED_DIR)
    }

    pub fn cohorts_dir(&self) -> PathBuf {
        self.processed_dir().join("cohorts")
    }

    pub fn qa_dir(&self) -> PathBuf {
        self.out_dir.join(QA_DIR)
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.out_dir.join(STATS_DIR)
    }

    /// Scratch directory for disposable join indexes.
    pub fn work_dir(&self) -> PathBuf {
        self.out_dir.join(WORK_DIR)
    }

    pub fn er_table(&self, name: &str) -> PathBuf {
        self.er_dir().join(format!("{name}.csv.gz"))
    }

    pub fn standard_table(&self, name: &str) -> PathBuf {
        self.standard_dir().join(format!("{name}.csv.gz"))
    }

    pub fn read_options(&self) -> ReadOptions {
        let engine = &self.options.engine;
        ReadOptions::default()
            .with_chunk_size(engine.chunk_size)
            .with_verify_integrity(engine.verify_integrity)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            coercion: self.options.engine.coercion,
            sample_limit: self.options.engine.rejected_sample_size,
            read: self.read_options(),
        }
    }

    pub fn join_spec(&self) -> JoinSpec {
        JoinSpec::from_options(REPORT_KEY_COLUMN, self.work_dir(), &self.options.engine)
    }

    pub fn vocab_dir(&self) -> Result<&Path> {
        self.options
            .vocab_dir
            .as_deref()
            .ok_or(CoreError::MissingVocabDir)
    }

    pub fn load_vocabulary(&self) -> Result<VocabularyStore> {
        Ok(VocabularyStore::load(self.vocab_dir()?, &self.load_options())?)
    }

    /// Opens a table written by an earlier stage as a chunk stream.
    pub fn open_output(&self, stage: &'static str, path: &Path) -> Result<ShardReader> {
        self.open_output_with(stage, path, ColumnContract::any())
    }

    pub fn open_output_with(
        &self,
        stage: &'static str,
        path: &Path,
        contract: ColumnContract,
    ) -> Result<ShardReader> {
        if !path.is_file() {
            return Err(CoreError::MissingInput {
                stage,
                path: path.to_path_buf(),
            });
        }
        Ok(ShardReader::open_file(path, contract, self.read_options())?)
    }

    /// Reads a whole earlier-stage table, projected onto `contract`.
    pub fn read_output(
        &self,
        stage: &'static str,
        path: &Path,
        contract: ColumnContract,
    ) -> Result<Table> {
        Ok(self.open_output_with(stage, path, contract)?.read_all()?)
    }
}
