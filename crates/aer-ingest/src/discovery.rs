//! Shard and table file discovery.

use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

const TABULAR_SUFFIXES: [&str; 9] = [
    ".csv",
    ".tsv",
    ".txt",
    ".csv.gz",
    ".csv.gzip",
    ".tsv.gz",
    ".tsv.gzip",
    ".txt.gz",
    ".txt.gzip",
];

const COMPRESSED_SUFFIXES: [&str; 2] = [".gz", ".gzip"];

fn lower_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_ascii_lowercase)
}

/// True for gzip-compressed inputs (`.gz`, `.gzip`).
pub fn is_compressed(path: &Path) -> bool {
    lower_file_name(path).is_some_and(|name| {
        COMPRESSED_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
    })
}

/// True for delimited text files, compressed or not.
pub fn is_tabular_file(path: &Path) -> bool {
    lower_file_name(path).is_some_and(|name| {
        !name.starts_with('.')
            && TABULAR_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix))
    })
}

/// Lists tabular shard files in a directory, sorted by filename.
pub fn list_shard_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|e| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_tabular_file(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Finds a table by base name (`CONCEPT.csv`), also trying `.gz`/`.gzip`
/// variants and one level of subdirectories.
pub fn find_table_file(dir: &Path, base_name: &str) -> Option<PathBuf> {
    let candidates = |root: &Path| -> Option<PathBuf> {
        [
            base_name.to_string(),
            format!("{base_name}.gz"),
            format!("{base_name}.gzip"),
        ]
        .into_iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
    };

    if let Some(found) = candidates(dir) {
        return Some(found);
    }
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    subdirs.iter().find_map(|sub| candidates(sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_sorted_tabular_shards() {
        let dir = TempDir::new().expect("temp dir");
        for name in ["0002.csv.gzip", "0001.csv.gz", "notes.md", ".hidden.csv"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let files = list_shard_files(dir.path()).expect("list");
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["0001.csv.gz", "0002.csv.gzip"]);
    }

    #[test]
    fn missing_directory_is_error() {
        let dir = TempDir::new().expect("temp dir");
        let err = list_shard_files(&dir.path().join("report")).expect_err("missing");
        assert!(matches!(err, IngestError::DirectoryNotFound { .. }));
    }

    #[test]
    fn finds_table_in_subdirectory() {
        let dir = TempDir::new().expect("temp dir");
        let sub = dir.path().join("athena");
        std::fs::create_dir(&sub).expect("mkdir");
        std::fs::write(sub.join("CONCEPT.csv.gz"), b"x").expect("write");
        let found = find_table_file(dir.path(), "CONCEPT.csv").expect("found");
        assert_eq!(found, sub.join("CONCEPT.csv.gz"));
        assert!(find_table_file(dir.path(), "CONCEPT_RELATIONSHIP.csv").is_none());
    }

    #[test]
    fn classifies_compression() {
        assert!(is_compressed(Path::new("a/0001.csv.gzip")));
        assert!(is_compressed(Path::new("CONCEPT.csv.GZ")));
        assert!(!is_compressed(Path::new("CONCEPT.csv")));
    }
}
