//! Gzip JSON snapshots of concept-id sets.
//!
//! A snapshot is a plain value: it is written once by the standardization
//! stage and read back by whoever needs it, never cached process-wide.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use aer_model::ConceptId;

use crate::error::{Result, VocabError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptSnapshot {
    pub label: String,
    /// Ascending, distinct.
    pub concept_ids: Vec<ConceptId>,
}

impl ConceptSnapshot {
    pub fn new(label: impl Into<String>, ids: &BTreeSet<ConceptId>) -> Self {
        Self {
            label: label.into(),
            concept_ids: ids.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.concept_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concept_ids.is_empty()
    }

    pub fn contains(&self, id: ConceptId) -> bool {
        self.concept_ids.binary_search(&id).is_ok()
    }
}

pub fn write_snapshot(path: &Path, label: &str, ids: &BTreeSet<ConceptId>) -> Result<ConceptSnapshot> {
    let snapshot = ConceptSnapshot::new(label, ids);
    let write_err = |source| VocabError::SnapshotWrite {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, &snapshot).map_err(|source| VocabError::SnapshotFormat {
        path: path.to_path_buf(),
        source,
    })?;
    let mut inner = encoder.finish().map_err(write_err)?;
    inner.flush().map_err(write_err)?;
    debug!(path = %path.display(), label, concepts = snapshot.len(), "wrote concept snapshot");
    Ok(snapshot)
}

pub fn read_snapshot(path: &Path) -> Result<ConceptSnapshot> {
    let file = File::open(path).map_err(|source| VocabError::SnapshotRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut snapshot: ConceptSnapshot =
        serde_json::from_reader(BufReader::new(GzDecoder::new(file))).map_err(|source| {
            VocabError::SnapshotFormat {
                path: path.to_path_buf(),
                source,
            }
        })?;
    snapshot.concept_ids.sort_unstable();
    snapshot.concept_ids.dedup();
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rxnorm_concept_ids.json.gz");
        let ids = BTreeSet::from([42, 7, 19]);
        let written = write_snapshot(&path, "rxnorm", &ids).unwrap();
        let read = read_snapshot(&path).unwrap();
        assert_eq!(written, read);
        assert_eq!(read.concept_ids, vec![7, 19, 42]);
        assert!(read.contains(19));
        assert!(!read.contains(20));
    }

    #[test]
    fn plain_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json.gz");
        std::fs::write(&path, br#"{"label":"x","concept_ids":[]}"#).unwrap();
        assert!(matches!(
            read_snapshot(&path),
            Err(VocabError::SnapshotFormat { .. })
        ));
    }
}
