//! Bounded-memory multi-way join over a shared report key.
//!
//! One input drives the join chunk by chunk. Every other input is loaded once,
//! into memory while it is small and into the on-disk [`KeyIndex`] once it
//! grows past the in-memory threshold. Each driver chunk collects its key set,
//! fetches exactly the matching rows of the other inputs, folds them per key
//! and hands the result to a [`RowSink`] before the next chunk is read.
//!
//! Keys present only in outer inputs are emitted after the driver is
//! exhausted, in ascending key order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use aer_model::{EngineOptions, JoinType, Table, normalize_report_key};

use crate::error::{JoinError, Result};
use crate::fold::{KeyRows, fold_key};
use crate::index::{KeyIndex, Row};
use crate::layout::{InputLayout, output_headers};
use crate::source::{ChunkSource, TableChunks};

/// Tuning and placement of one join run.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Name of the key column in the output.
    pub key_column: String,
    /// Maximum driver rows folded at once.
    pub chunk_size: usize,
    pub index_batch_size: usize,
    pub commit_every: usize,
    /// Inputs with more rows than this spill to the on-disk index.
    pub in_memory_threshold: usize,
    /// Spill every non-driver input regardless of size.
    pub force_index: bool,
    /// Directory for the disposable index file.
    pub index_dir: PathBuf,
}

impl JoinSpec {
    pub fn new(key_column: impl Into<String>, index_dir: impl Into<PathBuf>) -> Self {
        Self::from_options(key_column, index_dir, &EngineOptions::default())
    }

    pub fn from_options(
        key_column: impl Into<String>,
        index_dir: impl Into<PathBuf>,
        options: &EngineOptions,
    ) -> Self {
        Self {
            key_column: key_column.into(),
            chunk_size: options.chunk_size,
            index_batch_size: options.index_batch_size,
            commit_every: options.commit_every,
            in_memory_threshold: options.in_memory_threshold,
            force_index: false,
            index_dir: index_dir.into(),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_in_memory_threshold(mut self, rows: usize) -> Self {
        self.in_memory_threshold = rows;
        self
    }

    #[must_use]
    pub fn with_force_index(mut self, force: bool) -> Self {
        self.force_index = force;
        self
    }

    #[must_use]
    pub fn with_index_batch_size(mut self, batch_size: usize) -> Self {
        self.index_batch_size = batch_size;
        self
    }
}

/// One table taking part in a join.
pub struct JoinInput<'a> {
    name: String,
    key_column: String,
    prefix: Option<String>,
    join_type: JoinType,
    size_hint: Option<u64>,
    source: Box<dyn ChunkSource + 'a>,
}

impl<'a> JoinInput<'a> {
    pub fn new(
        name: impl Into<String>,
        key_column: impl Into<String>,
        source: impl ChunkSource + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            prefix: None,
            join_type: JoinType::Inner,
            size_hint: None,
            source: Box::new(source),
        }
    }

    /// In-memory table input; its row count becomes the size hint.
    pub fn from_table(name: impl Into<String>, key_column: impl Into<String>, table: Table) -> Self {
        let rows = table.len() as u64;
        let chunk_size = table.len().max(1);
        Self::new(name, key_column, TableChunks::new(table, chunk_size)).with_size_hint(rows)
    }

    /// Prefix applied to this input's non-key output columns.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// How this input combines with the inputs before it. Ignored for the
    /// first input.
    #[must_use]
    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    #[must_use]
    pub fn with_size_hint(mut self, rows: u64) -> Self {
        self.size_hint = Some(rows);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Receives joined rows chunk by chunk.
pub trait RowSink {
    fn write_chunk(&mut self, chunk: Table) -> Result<()>;
}

impl<F> RowSink for F
where
    F: FnMut(Table) -> Result<()>,
{
    fn write_chunk(&mut self, chunk: Table) -> Result<()> {
        self(chunk)
    }
}

/// Collects every chunk into one in-memory table.
#[derive(Debug, Clone)]
pub struct CollectSink {
    table: Table,
}

impl CollectSink {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            table: Table::new(headers),
        }
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

impl RowSink for CollectSink {
    fn write_chunk(&mut self, chunk: Table) -> Result<()> {
        self.table.append(chunk)?;
        Ok(())
    }
}

/// Counters describing one join run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub driver: String,
    pub chunks: u64,
    pub output_rows: u64,
    pub input_rows: BTreeMap<String, u64>,
    /// Rows dropped because their key was absent.
    pub null_keys: BTreeMap<String, u64>,
    pub indexed_inputs: Vec<String>,
    /// Keys emitted only because an outer input carried them.
    pub leftover_keys: u64,
    pub join_types: BTreeMap<String, JoinType>,
}

/// Picks the driving input.
///
/// The smallest input drives only when every join is inner and every input
/// has a size hint; otherwise the first input anchors the join.
pub fn choose_driver(inputs: &[(JoinType, Option<u64>)]) -> usize {
    let all_inner = inputs.iter().skip(1).all(|(join_type, _)| *join_type == JoinType::Inner);
    let hints: Option<Vec<u64>> = inputs.iter().map(|(_, hint)| *hint).collect();
    match hints {
        Some(hints) if all_inner => hints
            .iter()
            .enumerate()
            .min_by_key(|(idx, rows)| (**rows, *idx))
            .map_or(0, |(idx, _)| idx),
        _ => 0,
    }
}

enum Storage {
    Memory(HashMap<String, Vec<Row>>),
    Indexed,
}

struct LoadedInput {
    id: usize,
    storage: Storage,
}

/// Driver keys already folded, for outer inputs.
enum SeenKeys {
    Memory(HashSet<String>),
    Indexed,
}

pub struct StreamingJoin<'a> {
    spec: JoinSpec,
    inputs: Vec<JoinInput<'a>>,
}

impl<'a> StreamingJoin<'a> {
    pub fn new(spec: JoinSpec) -> Self {
        Self {
            spec,
            inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: JoinInput<'a>) -> Self {
        self.inputs.push(input);
        self
    }

    fn layouts(&self) -> Result<Vec<InputLayout>> {
        self.inputs
            .iter()
            .map(|input| {
                InputLayout::new(
                    &input.name,
                    input.source.headers(),
                    &input.key_column,
                    input.prefix.as_deref(),
                    input.join_type,
                )
            })
            .collect()
    }

    pub fn output_headers(&self) -> Result<Vec<String>> {
        output_headers(&self.spec.key_column, &self.layouts()?)
    }

    /// Runs the join, writing every output chunk to `sink`.
    pub fn run<S: RowSink + ?Sized>(self, sink: &mut S) -> Result<JoinReport> {
        let start = Instant::now();
        if self.inputs.is_empty() {
            return Err(JoinError::NoInputs);
        }
        let layouts = self.layouts()?;
        let headers = output_headers(&self.spec.key_column, &layouts)?;
        let hints: Vec<(JoinType, Option<u64>)> = self
            .inputs
            .iter()
            .map(|input| (input.join_type, input.size_hint))
            .collect();
        let driver_id = choose_driver(&hints);

        let StreamingJoin { spec, inputs } = self;
        let mut report = JoinReport {
            driver: inputs[driver_id].name.clone(),
            ..JoinReport::default()
        };
        for (position, input) in inputs.iter().enumerate().skip(1) {
            report.join_types.insert(input.name.clone(), layouts[position].join_type);
        }

        let mut index: Option<KeyIndex> = None;
        let mut loaded = Vec::new();
        let mut driver_source = None;
        for (id, input) in inputs.into_iter().enumerate() {
            if id == driver_id {
                driver_source = Some(input.source);
                continue;
            }
            let storage = load_input(id, input.source, &layouts[id], &spec, &mut index, &mut report)?;
            loaded.push(LoadedInput { id, storage });
        }
        let Some(mut driver) = driver_source else {
            return Err(JoinError::NoInputs);
        };

        let outer_ids: Vec<usize> = loaded
            .iter()
            .filter(|input| layouts[input.id].join_type == JoinType::Outer)
            .map(|input| input.id)
            .collect();
        let mut seen = if outer_ids.is_empty() {
            None
        } else if index.is_some() {
            Some(SeenKeys::Indexed)
        } else {
            Some(SeenKeys::Memory(HashSet::new()))
        };

        let folder = Folder {
            layouts: &layouts,
            headers: &headers,
            driver_id,
            loaded: &loaded,
        };

        let chunk_size = spec.chunk_size.max(1);
        let driver_layout = &layouts[driver_id];
        while let Some(chunk) = driver.next_chunk()? {
            let mut rows = chunk.rows;
            while !rows.is_empty() {
                let rest = rows.split_off(chunk_size.min(rows.len()));
                folder.fold_driver_chunk(rows, driver_layout, &mut index, &mut seen, &mut report, sink)?;
                rows = rest;
            }
        }

        if let Some(seen) = &seen {
            let leftover = leftover_keys(&loaded, &outer_ids, seen, &mut index)?;
            report.leftover_keys = leftover.len() as u64;
            let leftover: Vec<String> = leftover.into_iter().collect();
            for batch in leftover.chunks(chunk_size) {
                folder.fold_keys(batch, &HashMap::new(), None, &mut index, &mut report, sink)?;
            }
        }

        if let Some(index) = index {
            index.discard()?;
        }
        info!(
            driver = %report.driver,
            chunks = report.chunks,
            output_rows = report.output_rows,
            indexed = report.indexed_inputs.len(),
            leftover_keys = report.leftover_keys,
            duration_ms = start.elapsed().as_millis(),
            "join finished"
        );
        Ok(report)
    }
}

fn index_for<'i>(index: &'i mut Option<KeyIndex>, spec: &JoinSpec) -> Result<&'i mut KeyIndex> {
    let existing = match index.take() {
        Some(existing) => existing,
        None => KeyIndex::create(&spec.index_dir, spec.index_batch_size, spec.commit_every)?,
    };
    Ok(index.insert(existing))
}

/// Reads a non-driver input into memory, spilling to the index when it
/// outgrows the threshold.
fn load_input(
    id: usize,
    mut source: Box<dyn ChunkSource + '_>,
    layout: &InputLayout,
    spec: &JoinSpec,
    index: &mut Option<KeyIndex>,
    report: &mut JoinReport,
) -> Result<Storage> {
    let mut memory: HashMap<String, Vec<Row>> = HashMap::new();
    let mut in_memory = 0usize;
    let mut spilled = spec.force_index;
    let mut rows_read = 0u64;
    let mut null_keys = 0u64;

    while let Some(chunk) = source.next_chunk()? {
        for row in &chunk.rows {
            rows_read += 1;
            let Some(key) = normalize_report_key(layout.key(row)) else {
                null_keys += 1;
                continue;
            };
            let values = layout.values(row);
            if spilled {
                index_for(index, spec)?.insert_row(id, &key, &values)?;
                continue;
            }
            memory.entry(key).or_default().push(values);
            in_memory += 1;
            if in_memory > spec.in_memory_threshold {
                let target = index_for(index, spec)?;
                for (key, rows) in memory.drain() {
                    for values in rows {
                        target.insert_row(id, &key, &values)?;
                    }
                }
                spilled = true;
            }
        }
    }

    report.input_rows.insert(layout.name.clone(), rows_read);
    report.null_keys.insert(layout.name.clone(), null_keys);
    debug!(
        input = %layout.name,
        rows = rows_read,
        null_keys,
        indexed = spilled,
        "loaded join input"
    );
    if spilled {
        if let Some(index) = index.as_mut() {
            index.commit()?;
        }
        report.indexed_inputs.push(layout.name.clone());
        Ok(Storage::Indexed)
    } else {
        Ok(Storage::Memory(memory))
    }
}

/// Keys of outer inputs never seen in the driver, ascending.
fn leftover_keys(
    loaded: &[LoadedInput],
    outer_ids: &[usize],
    seen: &SeenKeys,
    index: &mut Option<KeyIndex>,
) -> Result<BTreeSet<String>> {
    let mut leftover = BTreeSet::new();
    let mut indexed_outer = Vec::new();
    for input in loaded.iter().filter(|input| outer_ids.contains(&input.id)) {
        match &input.storage {
            Storage::Indexed => indexed_outer.push(input.id),
            Storage::Memory(rows) => match seen {
                SeenKeys::Memory(seen) => {
                    leftover.extend(rows.keys().filter(|key| !seen.contains(*key)).cloned());
                }
                SeenKeys::Indexed => {
                    if let Some(index) = index.as_mut() {
                        let keys: Vec<&str> = rows.keys().map(String::as_str).collect();
                        leftover.extend(index.filter_unseen(&keys)?);
                    }
                }
            },
        }
    }
    if !indexed_outer.is_empty()
        && let Some(index) = index.as_mut()
    {
        leftover.extend(index.unseen_keys(&indexed_outer)?);
    }
    Ok(leftover)
}

/// Per-run state shared by driver chunks and the leftover phase.
struct Folder<'r> {
    layouts: &'r [InputLayout],
    headers: &'r [String],
    driver_id: usize,
    loaded: &'r [LoadedInput],
}

impl Folder<'_> {
    fn fold_driver_chunk<S: RowSink + ?Sized>(
        &self,
        rows: Vec<Row>,
        layout: &InputLayout,
        index: &mut Option<KeyIndex>,
        seen: &mut Option<SeenKeys>,
        report: &mut JoinReport,
        sink: &mut S,
    ) -> Result<()> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
        let mut null_keys = 0u64;
        for row in &rows {
            let Some(key) = normalize_report_key(layout.key(row)) else {
                null_keys += 1;
                continue;
            };
            let values = layout.values(row);
            match grouped.get_mut(&key) {
                Some(existing) => existing.push(values),
                None => {
                    order.push(key.clone());
                    grouped.insert(key, vec![values]);
                }
            }
        }
        *report.input_rows.entry(layout.name.clone()).or_default() += rows.len() as u64;
        *report.null_keys.entry(layout.name.clone()).or_default() += null_keys;

        let fresh: Option<HashSet<String>> = match seen {
            None => None,
            Some(SeenKeys::Memory(set)) => Some(
                order
                    .iter()
                    .filter(|key| set.insert((*key).clone()))
                    .cloned()
                    .collect(),
            ),
            Some(SeenKeys::Indexed) => match index.as_mut() {
                Some(index) => {
                    let keys: Vec<&str> = order.iter().map(String::as_str).collect();
                    Some(index.mark_seen(&keys)?.into_iter().collect())
                }
                None => None,
            },
        };
        self.fold_keys(&order, &grouped, fresh.as_ref(), index, report, sink)
    }

    /// Folds `keys`, taking driver rows from `driver_rows`. Keys outside
    /// `fresh` (when given) may not be revived by outer inputs.
    fn fold_keys<S: RowSink + ?Sized>(
        &self,
        keys: &[String],
        driver_rows: &HashMap<String, Vec<Row>>,
        fresh: Option<&HashSet<String>>,
        index: &mut Option<KeyIndex>,
        report: &mut JoinReport,
        sink: &mut S,
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut fetched: HashMap<usize, HashMap<String, Vec<Row>>> = HashMap::new();
        for input in self.loaded {
            if let (Storage::Indexed, Some(index)) = (&input.storage, index.as_mut()) {
                fetched.insert(input.id, index.fetch_rows(input.id, &key_refs)?);
            }
        }

        let empty: Vec<Row> = Vec::new();
        let mut out = Table::new(self.headers.to_vec());
        for key in keys {
            let mut per_input: Vec<KeyRows<'_>> = Vec::with_capacity(self.layouts.len());
            for (id, layout) in self.layouts.iter().enumerate() {
                let rows = if id == self.driver_id {
                    driver_rows.get(key).unwrap_or(&empty)
                } else {
                    self.side_rows(id, key, &fetched).unwrap_or(&empty)
                };
                per_input.push(KeyRows {
                    rows,
                    width: layout.width(),
                    join_type: layout.join_type,
                });
            }
            let revive = fresh.is_none_or(|fresh| fresh.contains(key));
            for row in fold_key(&per_input, revive) {
                let mut full = Vec::with_capacity(row.len() + 1);
                full.push(key.clone());
                full.extend(row);
                out.rows.push(full);
            }
        }

        report.chunks += 1;
        report.output_rows += out.len() as u64;
        if !out.is_empty() {
            sink.write_chunk(out)?;
        }
        Ok(())
    }

    fn side_rows<'s>(
        &'s self,
        id: usize,
        key: &str,
        fetched: &'s HashMap<usize, HashMap<String, Vec<Row>>>,
    ) -> Option<&'s Vec<Row>> {
        let input = self.loaded.iter().find(|input| input.id == id)?;
        match &input.storage {
            Storage::Memory(rows) => rows.get(key),
            Storage::Indexed => fetched.get(&id)?.get(key),
        }
    }
}
