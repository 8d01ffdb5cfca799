//! Stage identity and the outcome every stage reports.

use std::fmt;
use std::path::{Path, PathBuf};

use aer_model::Table;
use aer_report::{StageStats, TableWriter, WrittenTable};

use crate::context::PipelineContext;
use crate::error::Result;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Entities,
    Standardize,
    Baseline,
    Pairs,
    Qa,
    Cohorts,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Entities,
        Stage::Standardize,
        Stage::Baseline,
        Stage::Pairs,
        Stage::Qa,
        Stage::Cohorts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Entities => "entities",
            Stage::Standardize => "standardize",
            Stage::Baseline => "baseline",
            Stage::Pairs => "pairs",
            Stage::Qa => "qa",
            Stage::Cohorts => "cohorts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics of a finished stage and where they were written.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    pub stats: StageStats,
    pub stats_path: PathBuf,
}

impl StageOutcome {
    pub(crate) fn finish(ctx: &PipelineContext, stage: Stage, stats: StageStats) -> Result<Self> {
        let stats_path = stats.write(&ctx.stats_dir())?;
        Ok(Self {
            stage,
            stats,
            stats_path,
        })
    }

    pub fn output_rows(&self, name: &str) -> Option<u64> {
        self.stats.outputs.get(name).map(|output| output.rows)
    }
}

/// Writes a whole table, tracking nulls in every column, and records it.
pub(crate) fn write_output(
    stats: &mut StageStats,
    name: &str,
    path: &Path,
    table: &Table,
    key_columns: &[&str],
) -> Result<WrittenTable> {
    let columns: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    let mut writer = TableWriter::create(path, table.headers.iter().cloned(), key_columns)?
        .track_nulls(&columns);
    writer.write_chunk(table)?;
    let written = writer.finish()?;
    stats.record_output(name, &written);
    Ok(written)
}
