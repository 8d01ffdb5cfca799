//! Deterministic gzip CSV output.
//!
//! A [`TableWriter`] fixes its column set at creation, in lexicographic order.
//! Each chunk is sorted by the declared key columns and then by the remaining
//! columns before it is appended, and the header is written once.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use polars::prelude::{Column, CsvWriter, DataFrame, NamedFrom, SerWriter, Series, SortMultipleOptions};
use serde::Serialize;
use tracing::debug;

use aer_model::Table;

use crate::error::{ReportError, Result};

/// Summary of one finished output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: u64,
    /// Empty cells per tracked column.
    pub null_counts: BTreeMap<String, u64>,
}

pub struct TableWriter {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    columns: Vec<String>,
    sort_order: Vec<String>,
    sort_rows: bool,
    null_counts: BTreeMap<String, u64>,
    rows: u64,
    header_written: bool,
}

impl TableWriter {
    /// Creates `path` (and its parent directory) for the given columns.
    ///
    /// `key_columns` lead the row sort order; key names that are not output
    /// columns are ignored.
    pub fn create<I, S>(path: &Path, columns: I, key_columns: &[&str]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        columns.sort();
        columns.dedup();

        let mut sort_order: Vec<String> = key_columns
            .iter()
            .filter(|key| columns.iter().any(|c| c == *key))
            .map(|key| (*key).to_string())
            .collect();
        for column in &columns {
            if !sort_order.contains(column) {
                sort_order.push(column.clone());
            }
        }

        let file = File::create(path).map_err(|source| ReportError::CreateFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            columns,
            sort_order,
            sort_rows: true,
            null_counts: BTreeMap::new(),
            rows: 0,
            header_written: false,
        })
    }

    /// Tracks empty cells for these columns.
    #[must_use]
    pub fn track_nulls(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if self.columns.iter().any(|c| c == column) {
                self.null_counts.insert((*column).to_string(), 0);
            }
        }
        self
    }

    /// Writes rows in the order they are given, for tables ranked by the caller.
    #[must_use]
    pub fn keep_row_order(mut self) -> Self {
        self.sort_rows = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Sorts and appends one chunk.
    pub fn write_chunk(&mut self, chunk: &Table) -> Result<()> {
        let mut actual = chunk.headers.clone();
        actual.sort();
        if actual != self.columns {
            return Err(ReportError::ColumnMismatch {
                path: self.path.clone(),
                expected: self.columns.clone(),
                actual: chunk.headers.clone(),
            });
        }

        let mut frame = self.frame(chunk)?;
        if self.sort_rows && chunk.len() > 1 {
            frame = frame
                .sort(self.sort_order.clone(), SortMultipleOptions::default())
                .map_err(|source| ReportError::Frame {
                    path: self.path.clone(),
                    source,
                })?;
        }
        self.write_frame(&mut frame)?;

        for (header, idx) in chunk.headers.iter().zip(0..) {
            if let Some(count) = self.null_counts.get_mut(header) {
                *count += chunk
                    .rows
                    .iter()
                    .filter(|row| row.get(idx).is_none_or(String::is_empty))
                    .count() as u64;
            }
        }
        self.rows += chunk.len() as u64;
        Ok(())
    }

    /// One string column per output column; empty cells become nulls.
    fn frame(&self, chunk: &Table) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            let idx = chunk.require_column(name)?;
            let values: Vec<Option<&str>> = chunk
                .rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).filter(|cell| !cell.is_empty()))
                .collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }
        DataFrame::new(columns).map_err(|source| ReportError::Frame {
            path: self.path.clone(),
            source,
        })
    }

    fn write_frame(&mut self, frame: &mut DataFrame) -> Result<()> {
        CsvWriter::new(&mut self.encoder)
            .include_header(!self.header_written)
            .finish(frame)
            .map_err(|source| ReportError::Frame {
                path: self.path.clone(),
                source,
            })?;
        self.header_written = true;
        Ok(())
    }

    /// Writes the header if no chunk was written and closes the file.
    pub fn finish(mut self) -> Result<WrittenTable> {
        if !self.header_written {
            let empty = Table::new(self.columns.clone());
            let mut frame = self.frame(&empty)?;
            self.write_frame(&mut frame)?;
        }
        let write_err = |source| ReportError::Write {
            path: self.path.clone(),
            source,
        };
        let mut inner = self.encoder.finish().map_err(write_err)?;
        inner.flush().map_err(write_err)?;
        debug!(
            path = %self.path.display(),
            rows = self.rows,
            columns = self.columns.len(),
            "wrote table"
        );
        Ok(WrittenTable {
            path: self.path,
            columns: self.columns,
            rows: self.rows,
            null_counts: self.null_counts,
        })
    }
}

/// Writes a whole table in one call.
pub fn write_table(path: &Path, table: &Table, key_columns: &[&str]) -> Result<WrittenTable> {
    let mut writer = TableWriter::create(path, table.headers.iter().cloned(), key_columns)?;
    let tracked: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    writer = writer.track_nulls(&tracked);
    writer.write_chunk(table)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn read_gz(path: &Path) -> String {
        let mut text = String::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn sorts_columns_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/reactions.csv.gz");
        let table = Table::from_str_rows(
            &["safetyreportid", "reaction_outcome", "reaction_meddrapt"],
            &[&["2", "1", "Nausea"], &["1", "", "Headache"], &["1", "2", "Dizziness"]],
        );
        let written = write_table(&path, &table, &["safetyreportid"]).unwrap();
        assert_eq!(written.rows, 3);
        assert_eq!(written.null_counts["reaction_outcome"], 1);
        assert_eq!(
            read_gz(&path),
            "reaction_meddrapt,reaction_outcome,safetyreportid\n\
             Dizziness,2,1\n\
             Headache,,1\n\
             Nausea,1,2\n"
        );
    }

    #[test]
    fn header_is_written_once_and_for_empty_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pairs.csv.gz");
        let mut writer = TableWriter::create(&path, ["b", "a"], &["a"]).unwrap();
        writer
            .write_chunk(&Table::from_str_rows(&["a", "b"], &[&["2", "x"]]))
            .unwrap();
        writer
            .write_chunk(&Table::from_str_rows(&["b", "a"], &[&["y", "1"]]))
            .unwrap();
        writer.finish().unwrap();
        assert_eq!(read_gz(&path), "a,b\n2,x\n1,y\n");

        let empty = dir.path().join("empty.csv.gz");
        TableWriter::create(&empty, ["z", "y"], &[]).unwrap().finish().unwrap();
        assert_eq!(read_gz(&empty), "y,z\n");
    }

    #[test]
    fn rejects_chunks_with_other_columns() {
        let dir = TempDir::new().unwrap();
        let mut writer = TableWriter::create(&dir.path().join("x.csv.gz"), ["a"], &[]).unwrap();
        let err = writer
            .write_chunk(&Table::from_str_rows(&["a", "b"], &[&["1", "2"]]))
            .unwrap_err();
        assert!(matches!(err, ReportError::ColumnMismatch { .. }));
    }

    #[test]
    fn ranked_tables_keep_their_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qa/unmapped_reactions.csv.gz");
        let mut writer = TableWriter::create(&path, ["reaction_meddrapt", "count_in_reports"], &[])
            .unwrap()
            .keep_row_order();
        writer
            .write_chunk(&Table::from_str_rows(
                &["reaction_meddrapt", "count_in_reports"],
                &[&["Rash", "12"], &["Fever", "3"]],
            ))
            .unwrap();
        writer.finish().unwrap();
        assert_eq!(read_gz(&path), "count_in_reports,reaction_meddrapt\n12,Rash\n3,Fever\n");
    }
}
