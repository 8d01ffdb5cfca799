//! Fixed-size chunked reading of delimited files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use tracing::debug;

use aer_model::{ColumnContract, FieldsAvailable, Table};

use crate::discovery::is_compressed;
use crate::error::{IngestError, Result};

const READ_BUFFER_BYTES: usize = 1 << 16;
const DELIMITER_CANDIDATES: [u8; 3] = [b'\t', b',', b'|'];

/// Options for chunked reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Maximum rows per chunk.
    pub chunk_size: usize,
    /// Field delimiter; detected from the header line when `None`.
    pub delimiter: Option<u8>,
    /// Run the gzip integrity pre-check before parsing.
    pub verify_integrity: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            delimiter: None,
            verify_integrity: true,
        }
    }
}

impl ReadOptions {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    #[must_use]
    pub fn with_verify_integrity(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }
}

pub(crate) fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().to_string()
}

/// Picks the candidate delimiter occurring most often in the header line.
/// Ties go to the earlier candidate (tab, comma, pipe).
fn detect_delimiter(header_line: &[u8]) -> u8 {
    let mut best = (b',', 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let count = header_line.iter().filter(|&&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn open_source(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::FileRead {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    if is_compressed(path) {
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }
}

/// Reads the header of `path` and resolves it against `contract`.
///
/// Returns the projected header names, the source index of each projected
/// column, and the fields descriptor.
fn resolve_contract(
    path: &Path,
    source_headers: &[String],
    contract: &ColumnContract,
) -> Result<(Vec<String>, Vec<usize>, FieldsAvailable)> {
    if contract.is_any() {
        let headers = source_headers.to_vec();
        let indices = (0..headers.len()).collect();
        let fields = FieldsAvailable::new(headers.iter().cloned(), Vec::new());
        return Ok((headers, indices, fields));
    }

    let position = |name: &str| source_headers.iter().position(|h| h == name);
    for required in &contract.required {
        if position(required).is_none() {
            return Err(IngestError::MissingColumn {
                column: required.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut headers = Vec::new();
    let mut indices = Vec::new();
    let mut missing = Vec::new();
    for column in contract.columns() {
        match position(column) {
            Some(idx) => {
                headers.push(column.to_string());
                indices.push(idx);
            }
            None => missing.push(column.to_string()),
        }
    }
    let fields = FieldsAvailable::new(headers.iter().cloned(), missing);
    Ok((headers, indices, fields))
}

/// Streams a delimited file as [`Table`] chunks of at most `chunk_size` rows.
pub struct ChunkedReader {
    path: PathBuf,
    reader: csv::Reader<Box<dyn BufRead + Send>>,
    headers: Vec<String>,
    indices: Vec<usize>,
    fields: FieldsAvailable,
    chunk_size: usize,
    rows_read: u64,
    record: StringRecord,
    finished: bool,
}

impl ChunkedReader {
    /// Opens `path`, parses its header and applies the column contract.
    ///
    /// A missing required column fails here, before any row is parsed.
    pub fn open(path: &Path, contract: &ColumnContract, options: &ReadOptions) -> Result<Self> {
        let mut source = open_source(path)?;
        let delimiter = match options.delimiter {
            Some(delimiter) => delimiter,
            None => {
                let buffered = source.fill_buf().map_err(|e| IngestError::CsvParse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                let line_end = buffered
                    .iter()
                    .position(|&b| b == b'\n')
                    .unwrap_or(buffered.len());
                detect_delimiter(&buffered[..line_end])
            }
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(source);
        let raw_headers = reader.headers().map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if raw_headers.is_empty() {
            return Err(IngestError::EmptyCsv {
                path: path.to_path_buf(),
            });
        }
        let source_headers: Vec<String> = raw_headers.iter().map(normalize_header).collect();
        let (headers, indices, fields) = resolve_contract(path, &source_headers, contract)?;
        debug!(
            path = %path.display(),
            delimiter = %(delimiter as char).escape_default(),
            columns = headers.len(),
            missing_optional = fields.missing_optional().count(),
            "opened chunked reader"
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            indices,
            fields,
            chunk_size: options.chunk_size.max(1),
            rows_read: 0,
            record: StringRecord::new(),
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
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

    /// Reads the next chunk; `None` once the file is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Table>> {
        if self.finished {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(self.chunk_size.min(8192));
        while rows.len() < self.chunk_size {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| IngestError::CsvParse {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
            if !more {
                self.finished = true;
                break;
            }
            if self.record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let row = self
                .indices
                .iter()
                .map(|&idx| self.record.get(idx).map(normalize_cell).unwrap_or_default())
                .collect();
            rows.push(row);
        }
        self.rows_read += rows.len() as u64;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Table::with_rows(self.headers.clone(), rows)))
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

impl Iterator for ChunkedReader {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Reads only the header of `path` and resolves the contract against it.
pub(crate) fn peek_fields(
    path: &Path,
    contract: &ColumnContract,
    options: &ReadOptions,
) -> Result<(Vec<String>, FieldsAvailable)> {
    let reader = ChunkedReader::open(path, contract, options)?;
    Ok((reader.headers, reader.fields))
}
