//! Sequential reading of a shard directory as one chunk stream.

use std::path::{Path, PathBuf};

use tracing::debug;

use aer_model::{ColumnContract, FieldsAvailable, Table};

use crate::chunked::{ChunkedReader, ReadOptions, peek_fields};
use crate::discovery::list_shard_files;
use crate::error::{IngestError, Result};
use crate::integrity::verify_all;

/// Reads shard files one after another, aligning each to a unified header.
///
/// Headers of all shards are resolved when the reader is opened, so a missing
/// required column in any shard fails before the first chunk is produced.
/// A chunk never spans two files.
pub struct ShardReader {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<ChunkedReader>,
    contract: ColumnContract,
    options: ReadOptions,
    headers: Vec<String>,
    fields: FieldsAvailable,
    rows_read: u64,
}

impl ShardReader {
    pub fn open(files: Vec<PathBuf>, contract: ColumnContract, options: ReadOptions) -> Result<Self> {
        if options.verify_integrity {
            verify_all(&files)?;
        }
        let mut headers: Vec<String> = Vec::new();
        let mut fields: Option<FieldsAvailable> = None;
        for file in &files {
            let (file_headers, file_fields) = peek_fields(file, &contract, &options)?;
            for header in file_headers {
                if !headers.contains(&header) {
                    headers.push(header);
                }
            }
            match fields.as_mut() {
                Some(existing) => existing.merge(&file_fields),
                None => fields = Some(file_fields),
            }
        }
        if !contract.is_any() {
            // Keep contract order regardless of which shard introduced a column.
            let order: Vec<&str> = contract.columns().collect();
            headers.sort_by_key(|h| order.iter().position(|c| *c == h.as_str()));
        }
        let fields = fields.unwrap_or_else(|| {
            FieldsAvailable::new(Vec::new(), contract.columns().map(str::to_string))
        });
        debug!(files = files.len(), columns = headers.len(), "opened shard reader");
        Ok(Self {
            files,
            next_file: 0,
            current: None,
            contract,
            options,
            headers,
            fields,
            rows_read: 0,
        })
    }

    /// Opens every shard in `dir`.
    pub fn open_dir(dir: &Path, contract: ColumnContract, options: ReadOptions) -> Result<Self> {
        let files = list_shard_files(dir)?;
        Self::open(files, contract, options)
    }

    /// Opens a single file.
    pub fn open_file(path: &Path, contract: ColumnContract, options: ReadOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::open(vec![path.to_path_buf()], contract, options)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn fields(&self) -> &FieldsAvailable {
        &self.fields
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn next_chunk(&mut self) -> Result<Option<Table>> {
        loop {
            if self.current.is_none() {
                let Some(file) = self.files.get(self.next_file) else {
                    return Ok(None);
                };
                self.next_file += 1;
                // Integrity was checked in `open`; skip it per file.
                let options = self.options.clone().with_verify_integrity(false);
                self.current = Some(ChunkedReader::open(file, &self.contract, &options)?);
            }
            let Some(reader) = self.current.as_mut() else {
                continue;
            };
            match reader.next_chunk()? {
                Some(chunk) => {
                    let aligned = align(chunk, &self.headers)?;
                    self.rows_read += aligned.len() as u64;
                    return Ok(Some(aligned));
                }
                None => self.current = None,
            }
        }
    }

    /// Reads all remaining rows into one table.
    pub fn read_all(mut self) -> Result<Table> {
        let mut table = Table::new(self.headers.clone());
        while let Some(chunk) = self.next_chunk()? {
            table.rows.extend(chunk.rows);
        }
        Ok(table)
    }
}

impl Iterator for ShardReader {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

pub(crate) fn align(chunk: Table, headers: &[String]) -> Result<Table> {
    if chunk.headers == headers {
        return Ok(chunk);
    }
    let mut aligned = Table::new(headers.to_vec());
    aligned.append(chunk)?;
    Ok(aligned)
}
