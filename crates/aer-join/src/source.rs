//! Chunk streams consumed by the join engine.

use std::collections::VecDeque;

use aer_ingest::ShardReader;
use aer_model::Table;

use crate::error::Result;

/// A table that can be read front to back in chunks.
pub trait ChunkSource {
    fn headers(&self) -> &[String];

    /// Next chunk, or `None` once the source is exhausted.
    fn next_chunk(&mut self) -> Result<Option<Table>>;
}

impl ChunkSource for ShardReader {
    fn headers(&self) -> &[String] {
        ShardReader::headers(self)
    }

    fn next_chunk(&mut self) -> Result<Option<Table>> {
        Ok(ShardReader::next_chunk(self)?)
    }
}

/// An in-memory table served in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct TableChunks {
    headers: Vec<String>,
    rows: VecDeque<Vec<String>>,
    chunk_size: usize,
}

impl TableChunks {
    pub fn new(table: Table, chunk_size: usize) -> Self {
        Self {
            headers: table.headers,
            rows: table.rows.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl ChunkSource for TableChunks {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self) -> Result<Option<Table>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let take = self.chunk_size.min(self.rows.len());
        let rows = self.rows.drain(..take).collect();
        Ok(Some(Table::with_rows(self.headers.clone(), rows)))
    }
}
