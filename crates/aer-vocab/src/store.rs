//! In-memory vocabulary snapshot: node table plus deduplicated edge list.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use aer_ingest::{IngestError, ReadOptions, ShardReader, find_table_file};
use aer_model::{
    CoercionPolicy, Coerced, ColumnContract, Concept, ConceptId, RejectedLedger, Relationship,
    Table, coerce_id,
};

use crate::error::{Result, VocabError};

pub const CONCEPT_TABLE: &str = "CONCEPT.csv";
pub const RELATIONSHIP_TABLE: &str = "CONCEPT_RELATIONSHIP.csv";

const CONCEPT_COLUMNS: [&str; 5] = [
    "concept_id",
    "concept_code",
    "concept_name",
    "concept_class_id",
    "vocabulary_id",
];
const RELATIONSHIP_COLUMNS: [&str; 3] = ["concept_id_1", "concept_id_2", "relationship_id"];

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub coercion: CoercionPolicy,
    pub sample_limit: usize,
    pub read: ReadOptions,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            coercion: CoercionPolicy::DropAndCount,
            sample_limit: 5,
            read: ReadOptions::default(),
        }
    }
}

/// Counters describing what loading kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VocabularyStats {
    pub concepts: usize,
    pub edges: usize,
    pub duplicate_concepts: u64,
    pub duplicate_edges: u64,
    pub self_loops: u64,
    pub dangling_edges: u64,
    /// Concept rows whose id cell was blank or a null token.
    pub blank_concept_ids: u64,
}

#[derive(Debug, Default)]
pub struct VocabularyStore {
    concepts: HashMap<ConceptId, Concept>,
    edges: Vec<Relationship>,
    outgoing: HashMap<ConceptId, (usize, usize)>,
    rejected: RejectedLedger,
    stats: VocabularyStats,
    has_standard_flags: bool,
}

impl VocabularyStore {
    /// Loads `CONCEPT` and `CONCEPT_RELATIONSHIP` from `dir`.
    ///
    /// Both tables are located and their headers checked before any row is
    /// parsed, so a missing table or column leaves nothing half-loaded.
    pub fn load(dir: &Path, options: &LoadOptions) -> Result<Self> {
        let start = Instant::now();
        if !dir.is_dir() {
            return Err(VocabError::DirectoryNotFound {
                path: dir.to_path_buf(),
            });
        }
        let concept_path = locate(dir, CONCEPT_TABLE)?;
        let relationship_path = locate(dir, RELATIONSHIP_TABLE)?;

        let concept_contract =
            ColumnContract::new(CONCEPT_COLUMNS).with_optional(["standard_concept"]);
        let relationship_contract = ColumnContract::new(RELATIONSHIP_COLUMNS);
        let mut concept_reader =
            ShardReader::open_file(&concept_path, concept_contract, options.read.clone())?;
        let mut relationship_reader = ShardReader::open_file(
            &relationship_path,
            relationship_contract,
            options.read.clone(),
        )?;

        let has_standard_flags = concept_reader.fields().has("standard_concept");
        let mut rejected = RejectedLedger::default();
        let mut concepts = Vec::new();
        let mut blank_ids = 0;
        while let Some(chunk) = concept_reader.next_chunk()? {
            parse_concepts(&chunk, &concept_path, options, &mut rejected, &mut blank_ids, &mut concepts)?;
        }
        let mut edges = Vec::new();
        while let Some(chunk) = relationship_reader.next_chunk()? {
            parse_relationships(&chunk, &relationship_path, options, &mut rejected, &mut edges)?;
        }

        let mut store = Self::from_parts(concepts, edges);
        if !rejected.is_empty() {
            warn!(rejected = rejected.total(), "vocabulary rows dropped by coercion");
        }
        store.rejected = rejected;
        store.has_standard_flags = has_standard_flags;
        store.stats.blank_concept_ids = blank_ids;
        if blank_ids > 0 {
            warn!(rows = blank_ids, "concept rows without an id dropped");
        }
        info!(
            dir = %dir.display(),
            concepts = store.stats.concepts,
            edges = store.stats.edges,
            duplicate_edges = store.stats.duplicate_edges,
            self_loops = store.stats.self_loops,
            duration_ms = start.elapsed().as_millis(),
            "loaded vocabulary"
        );
        Ok(store)
    }

    /// Builds a store from already-parsed rows.
    ///
    /// Duplicate concept ids keep the first row. Edges are deduplicated,
    /// self-loops and edges touching unknown concepts are dropped. Standard
    /// flags count as present when any concept carries one.
    pub fn from_parts<C, E>(concepts: C, edges: E) -> Self
    where
        C: IntoIterator<Item = Concept>,
        E: IntoIterator<Item = Relationship>,
    {
        let mut stats = VocabularyStats::default();
        let mut by_id = HashMap::new();
        let mut has_standard_flags = false;
        for concept in concepts {
            has_standard_flags |= concept.standard_concept.is_some();
            if by_id.contains_key(&concept.concept_id) {
                stats.duplicate_concepts += 1;
                continue;
            }
            by_id.insert(concept.concept_id, concept);
        }

        let mut unique = BTreeSet::new();
        for edge in edges {
            if edge.is_self_loop() {
                stats.self_loops += 1;
                continue;
            }
            if !by_id.contains_key(&edge.concept_id_1) || !by_id.contains_key(&edge.concept_id_2) {
                stats.dangling_edges += 1;
                continue;
            }
            if !unique.insert(edge) {
                stats.duplicate_edges += 1;
            }
        }
        // Sorted by source, destination, relationship: adjacency is a range.
        let edges: Vec<Relationship> = unique.into_iter().collect();
        let mut outgoing = HashMap::new();
        let mut start = 0;
        while start < edges.len() {
            let source = edges[start].concept_id_1;
            let end = start
                + edges[start..]
                    .iter()
                    .take_while(|edge| edge.concept_id_1 == source)
                    .count();
            outgoing.insert(source, (start, end));
            start = end;
        }

        stats.concepts = by_id.len();
        stats.edges = edges.len();
        Self {
            concepts: by_id,
            edges,
            outgoing,
            rejected: RejectedLedger::default(),
            stats,
            has_standard_flags,
        }
    }

    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(&id)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn edges(&self) -> &[Relationship] {
        &self.edges
    }

    /// Outgoing edges of `id`, ordered by destination then relationship.
    pub fn outgoing(&self, id: ConceptId) -> &[Relationship] {
        match self.outgoing.get(&id) {
            Some(&(start, end)) => &self.edges[start..end],
            None => &[],
        }
    }

    /// Concepts of one vocabulary, optionally one class, ordered by id.
    pub fn filter(&self, vocabulary_id: &str, concept_class_id: Option<&str>) -> Vec<&Concept> {
        let mut matches: Vec<&Concept> = self
            .concepts
            .values()
            .filter(|concept| concept.in_vocabulary(vocabulary_id))
            .filter(|concept| concept_class_id.is_none_or(|class| concept.is_class(class)))
            .collect();
        matches.sort_by_key(|concept| concept.concept_id);
        matches
    }

    pub fn rejected(&self) -> &RejectedLedger {
        &self.rejected
    }

    pub fn stats(&self) -> &VocabularyStats {
        &self.stats
    }

    /// Whether the concept table carried `standard_concept` at all.
    pub fn has_standard_flags(&self) -> bool {
        self.has_standard_flags
    }
}

fn locate(dir: &Path, table: &str) -> Result<PathBuf> {
    find_table_file(dir, table).ok_or_else(|| VocabError::MissingTable {
        table: table.to_string(),
        dir: dir.to_path_buf(),
    })
}

fn coerce_cell(
    value: &str,
    scope: &str,
    path: &Path,
    options: &LoadOptions,
    rejected: &mut RejectedLedger,
) -> Result<Option<ConceptId>> {
    match coerce_id(value) {
        Coerced::Value(id) => Ok(Some(id)),
        Coerced::Empty => Ok(None),
        Coerced::Rejected => {
            rejected
                .reject(scope, value, options.coercion, options.sample_limit)
                .map_err(|_| IngestError::InvalidValue {
                    field: scope.to_string(),
                    value: value.to_string(),
                    path: path.to_path_buf(),
                })?;
            Ok(None)
        }
    }
}

fn parse_concepts(
    chunk: &Table,
    path: &Path,
    options: &LoadOptions,
    rejected: &mut RejectedLedger,
    blank_ids: &mut u64,
    out: &mut Vec<Concept>,
) -> Result<()> {
    let id = chunk.require_column("concept_id")?;
    let code = chunk.require_column("concept_code")?;
    let name = chunk.require_column("concept_name")?;
    let class = chunk.require_column("concept_class_id")?;
    let vocabulary = chunk.require_column("vocabulary_id")?;
    let standard = chunk.column_index("standard_concept");
    for row in &chunk.rows {
        if matches!(coerce_id(&row[id]), Coerced::Empty) {
            *blank_ids += 1;
            continue;
        }
        let Some(concept_id) = coerce_cell(&row[id], "concept.concept_id", path, options, rejected)?
        else {
            continue;
        };
        let mut concept = Concept::new(
            concept_id,
            row[code].as_str(),
            row[name].as_str(),
            row[class].as_str(),
            row[vocabulary].as_str(),
        );
        if let Some(idx) = standard {
            concept = concept.with_standard_flag(row[idx].as_str());
        }
        out.push(concept);
    }
    Ok(())
}

fn parse_relationships(
    chunk: &Table,
    path: &Path,
    options: &LoadOptions,
    rejected: &mut RejectedLedger,
    out: &mut Vec<Relationship>,
) -> Result<()> {
    let first = chunk.require_column("concept_id_1")?;
    let second = chunk.require_column("concept_id_2")?;
    let kind = chunk.require_column("relationship_id")?;
    for row in &chunk.rows {
        let source = coerce_cell(&row[first], "concept_relationship.concept_id_1", path, options, rejected)?;
        let destination =
            coerce_cell(&row[second], "concept_relationship.concept_id_2", path, options, rejected)?;
        if let (Some(source), Some(destination)) = (source, destination) {
            out.push(Relationship::new(source, destination, row[kind].as_str()));
        }
    }
    Ok(())
}
