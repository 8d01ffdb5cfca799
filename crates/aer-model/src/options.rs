//! Configuration options for resolution and join processing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::concept::concept_class;
use crate::error::{ModelError, Result};

/// Join semantics applied when a side is folded into the driver rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// Keep keys present on both sides.
    #[default]
    Inner,
    /// Keep every driver key; pad missing side columns.
    Left,
    /// Keep keys present on either side.
    Outer,
}

impl JoinType {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Outer => "outer",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for identifier values that fail integer coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoercionPolicy {
    /// Abort the stage, naming the column and value.
    Fail,
    /// Drop the row and record it in the rejected-rows ledger.
    #[default]
    DropAndCount,
}

/// Graph traversal bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Maximum hops from a drug product to its ingredients.
    pub ingredient_max_depth: usize,
    /// Maximum hops from a preferred term to its top-level category.
    pub hierarchy_max_depth: usize,
    /// Ordered class sequence for hierarchy resolution, term first.
    pub hierarchy_levels: Vec<String>,
    /// Restrict ingredient traversal to standard concepts when the concept
    /// table flags them.
    pub standard_only: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            ingredient_max_depth: 6,
            hierarchy_max_depth: 4,
            hierarchy_levels: concept_class::MEDDRA_LEVELS
                .iter()
                .map(|level| (*level).to_string())
                .collect(),
            standard_only: true,
        }
    }
}

/// Chunking, concurrency and join tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Rows per chunk for streamed reads and join driving.
    pub chunk_size: usize,
    /// Worker-pool size for multi-shard ingestion.
    pub workers: usize,
    /// Keys per index lookup query.
    pub index_batch_size: usize,
    /// Rows per index write transaction.
    pub commit_every: usize,
    /// Sides with fewer rows than this are joined in memory.
    pub in_memory_threshold: usize,
    /// Join type for final materialization.
    pub join_type: JoinType,
    pub coercion: CoercionPolicy,
    /// Rejected values kept per column as a sample.
    pub rejected_sample_size: usize,
    /// Decompress every compressed input once before processing.
    pub verify_integrity: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            workers: 4,
            index_batch_size: 20_000,
            commit_every: 50_000,
            in_memory_threshold: 1_000_000,
            join_type: JoinType::Inner,
            coercion: CoercionPolicy::DropAndCount,
            rejected_sample_size: 5,
            verify_integrity: true,
        }
    }
}

/// Options for a full pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Directory holding `CONCEPT` and `CONCEPT_RELATIONSHIP` tables.
    pub vocab_dir: Option<PathBuf>,
    pub resolver: ResolverOptions,
    pub engine: EngineOptions,
}

impl PipelineOptions {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self> {
        let options: PipelineOptions =
            toml::from_str(text).map_err(|source| ModelError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Rejects values that would stall or degenerate a run.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("engine.chunk_size", self.engine.chunk_size),
            ("engine.workers", self.engine.workers),
            ("engine.index_batch_size", self.engine.index_batch_size),
            ("engine.commit_every", self.engine.commit_every),
            ("resolver.ingredient_max_depth", self.resolver.ingredient_max_depth),
            ("resolver.hierarchy_max_depth", self.resolver.hierarchy_max_depth),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ModelError::InvalidOption {
                    name: name.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.resolver.hierarchy_levels.len() < 2 {
            return Err(ModelError::InvalidOption {
                name: "resolver.hierarchy_levels".to_string(),
                reason: "needs at least a term level and a top level".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let text = r#"
vocab_dir = "/data/vocab"

[engine]
chunk_size = 500
join_type = "outer"
coercion = "fail"
"#;
        let options = PipelineOptions::from_toml_str(text, Path::new("aer.toml")).expect("parse");
        assert_eq!(options.vocab_dir, Some(PathBuf::from("/data/vocab")));
        assert_eq!(options.engine.chunk_size, 500);
        assert_eq!(options.engine.join_type, JoinType::Outer);
        assert_eq!(options.engine.coercion, CoercionPolicy::Fail);
        assert_eq!(options.engine.workers, 4);
        assert_eq!(options.resolver.ingredient_max_depth, 6);
        assert_eq!(options.resolver.hierarchy_levels, vec!["PT", "HLT", "HLGT", "SOC"]);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let text = "[engine]\nchunk_size = 0\n";
        let err = PipelineOptions::from_toml_str(text, Path::new("aer.toml")).expect_err("zero");
        assert!(matches!(err, ModelError::InvalidOption { .. }));
    }

    #[test]
    fn unknown_join_type_is_parse_error() {
        let text = "[engine]\njoin_type = \"cross\"\n";
        let err = PipelineOptions::from_toml_str(text, Path::new("aer.toml")).expect_err("bad");
        assert!(matches!(err, ModelError::ConfigParse { .. }));
    }
}
