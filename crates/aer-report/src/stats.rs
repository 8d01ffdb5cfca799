//! Companion statistics written next to every stage's output.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use aer_model::{FieldsAvailable, JoinType, RejectedLedger, Table};

use crate::error::{ReportError, Result};
use crate::writer::WrittenTable;

/// Pair counts before and after each resolution step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairEstimates {
    /// Sum over report keys of raw drug mentions × raw reaction mentions.
    pub pairs_pre_resolution: u64,
    /// Same sum once drugs are resolved to ingredients.
    pub pairs_after_ingredient: u64,
    /// Same sum once reactions are also resolved to terms.
    pub pairs_after_reaction: u64,
}

/// Row counts of one input table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InputStats {
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Row count and location of one output table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputStats {
    pub path: PathBuf,
    pub rows: u64,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub stage: String,
    pub generated_at: DateTime<Utc>,
    pub inputs: BTreeMap<String, InputStats>,
    pub outputs: BTreeMap<String, OutputStats>,
    pub null_counts: BTreeMap<String, BTreeMap<String, u64>>,
    pub unique_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_estimates: Option<PairEstimates>,
    pub rejected: RejectedLedger,
    pub fields: BTreeMap<String, FieldsAvailable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
    /// Stage-specific counters.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StageStats {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            generated_at: Utc::now(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            null_counts: BTreeMap::new(),
            unique_counts: BTreeMap::new(),
            pair_estimates: None,
            rejected: RejectedLedger::default(),
            fields: BTreeMap::new(),
            join_type: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn record_input(&mut self, name: impl Into<String>, rows: u64, path: Option<&Path>) {
        self.inputs.insert(
            name.into(),
            InputStats {
                rows,
                path: path.map(Path::to_path_buf),
            },
        );
    }

    /// Records a written table under `name`, keeping its tracked null counts.
    pub fn record_output(&mut self, name: impl Into<String>, written: &WrittenTable) {
        let name = name.into();
        if !written.null_counts.is_empty() {
            self.null_counts
                .insert(name.clone(), written.null_counts.clone());
        }
        self.outputs.insert(
            name,
            OutputStats {
                path: written.path.clone(),
                rows: written.rows,
                columns: written.columns.clone(),
            },
        );
    }

    pub fn record_fields(&mut self, name: impl Into<String>, fields: &FieldsAvailable) {
        self.fields.insert(name.into(), fields.clone());
    }

    /// Records the distinct non-empty values of `column` under `label`.
    pub fn record_unique(&mut self, label: impl Into<String>, table: &Table, column: &str) {
        if let Some(count) = table.unique_count(column) {
            self.unique_counts.insert(label.into(), count as u64);
        }
    }

    pub fn merge_rejected(&mut self, ledger: &RejectedLedger, sample_limit: usize) {
        self.rejected.merge(ledger, sample_limit);
    }

    #[must_use]
    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    #[must_use]
    pub fn with_pair_estimates(mut self, estimates: PairEstimates) -> Self {
        self.pair_estimates = Some(estimates);
        self
    }

    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Serialize) {
        // Counters and small maps only; a value that cannot serialize is skipped.
        if let Ok(value) = serde_json::to_value(value) {
            self.extra.insert(key.into(), value);
        }
    }

    /// Writes `<dir>/<stage>.json`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{}.json", self.stage));
        let file = File::create(&path).map_err(|source| ReportError::CreateFile {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| ReportError::Stats {
            path: path.clone(),
            source,
        })?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Rows per report key.
#[derive(Debug, Clone, Default)]
pub struct KeyCounter {
    counts: HashMap<String, u64>,
}

impl KeyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every row of `table` by the value of `column`; empty keys are skipped.
    pub fn from_column(table: &Table, column: &str) -> Self {
        let mut counter = Self::new();
        if let Some(values) = table.column_values(column) {
            for value in values {
                counter.add(value);
            }
        }
        counter
    }

    pub fn add(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        *self.counts.entry(key.to_string()).or_default() += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Rows counted across every key.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Σ over shared keys of `self[k] × other[k]`.
    pub fn product_sum(&self, other: &KeyCounter) -> u64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .counts
            .iter()
            .map(|(key, count)| count * large.get(key))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn product_sum_counts_only_shared_keys() {
        let drugs = Table::from_str_rows(
            &["safetyreportid", "drug"],
            &[&["R1", "a"], &["R1", "b"], &["R2", "c"], &["", "d"]],
        );
        let reactions = Table::from_str_rows(
            &["safetyreportid", "reaction"],
            &[&["R1", "x"], &["R1", "y"], &["R1", "z"], &["R3", "w"]],
        );
        let d = KeyCounter::from_column(&drugs, "safetyreportid");
        let r = KeyCounter::from_column(&reactions, "safetyreportid");
        assert_eq!(d.len(), 2);
        assert_eq!(d.product_sum(&r), 6);
        assert_eq!(r.product_sum(&d), 6);
    }

    #[test]
    fn writes_pretty_json_named_after_stage() {
        let dir = TempDir::new().unwrap();
        let mut stats = StageStats::new("pairs")
            .with_join_type(JoinType::Left)
            .with_pair_estimates(PairEstimates {
                pairs_pre_resolution: 6,
                pairs_after_ingredient: 4,
                pairs_after_reaction: 2,
            });
        stats.record_input("drugs", 3, None);
        stats.insert_extra("null_keys", 2u64);
        let path = stats.write(&dir.path().join("stats")).unwrap();
        assert!(path.ends_with("stats/pairs.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stage"], "pairs");
        assert_eq!(value["join_type"], "left");
        assert_eq!(value["inputs"]["drugs"]["rows"], 3);
        assert_eq!(value["pair_estimates"]["pairs_after_reaction"], 2);
        assert_eq!(value["extra"]["null_keys"], 2);
        assert!(value["generated_at"].is_string());
    }
}
