//! Bounded worker pool for directories of many small shards.
//!
//! Each worker owns its reader and buffers and sends a whole parsed shard
//! back over a channel; nothing is shared between workers. Shards arrive in
//! completion order, so the concatenated table has no meaningful row order
//! and callers sort it before writing.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, info};

use aer_model::{ColumnContract, FieldsAvailable, Table};

use crate::chunked::{ChunkedReader, ReadOptions};
use crate::discovery::is_compressed;
use crate::error::{IngestError, Result};
use crate::integrity::verify_gzip;
use crate::shards::align;

/// Concatenated shards of one logical table.
#[derive(Debug, Clone, Default)]
pub struct ShardSet {
    pub table: Table,
    pub fields: FieldsAvailable,
    pub files: usize,
}

fn read_one(path: &Path, contract: &ColumnContract, options: &ReadOptions) -> Result<(Table, FieldsAvailable)> {
    if options.verify_integrity && is_compressed(path) {
        verify_gzip(path)?;
    }
    let reader = ChunkedReader::open(path, contract, options)?;
    let fields = reader.fields().clone();
    let table = reader.read_all()?;
    Ok((table, fields))
}

/// Reads `files` with at most `workers` concurrent readers.
///
/// The first error encountered (in completion order) is returned after all
/// workers have stopped.
pub fn read_shards(
    files: &[PathBuf],
    contract: &ColumnContract,
    options: &ReadOptions,
    workers: usize,
) -> Result<ShardSet> {
    let start = Instant::now();
    let workers = workers.clamp(1, files.len().max(1));
    let (job_tx, job_rx) = bounded::<&Path>(workers);
    let (result_tx, result_rx) = unbounded();

    let results: Vec<(PathBuf, Result<(Table, FieldsAvailable)>)> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            handles.push(scope.spawn(move || {
                for path in job_rx {
                    let outcome = read_one(path, contract, options);
                    if result_tx.send((path.to_path_buf(), outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(job_rx);
        drop(result_tx);

        for path in files {
            if job_tx.send(path.as_path()).is_err() {
                break;
            }
        }
        drop(job_tx);

        let collected: Vec<_> = result_rx.iter().collect();
        let panicked = handles
            .into_iter()
            .map(thread::ScopedJoinHandle::join)
            .filter(std::result::Result::is_err)
            .count();
        if panicked > 0 {
            let done: Vec<&PathBuf> = collected.iter().map(|(path, _)| path).collect();
            if let Some(missing) = files.iter().find(|path| !done.contains(path)) {
                return vec![(
                    missing.clone(),
                    Err(IngestError::WorkerPanicked {
                        path: missing.clone(),
                    }),
                )];
            }
        }
        collected
    });

    let mut parts = Vec::with_capacity(results.len());
    for (path, outcome) in results {
        let (table, fields) = outcome?;
        debug!(path = %path.display(), rows = table.len(), "read shard");
        parts.push((table, fields));
    }

    let mut fields: Option<FieldsAvailable> = None;
    let mut headers: Vec<String> = Vec::new();
    for (table, part_fields) in &parts {
        for header in &table.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
        match fields.as_mut() {
            Some(existing) => existing.merge(part_fields),
            None => fields = Some(part_fields.clone()),
        }
    }
    if !contract.is_any() {
        let order: Vec<&str> = contract.columns().collect();
        headers.sort_by_key(|h| order.iter().position(|c| *c == h.as_str()));
    }

    let mut table = Table::new(headers.clone());
    for (part, _) in parts {
        let aligned = align(part, &headers)?;
        table.rows.extend(aligned.rows);
    }
    let fields = fields.unwrap_or_else(|| {
        FieldsAvailable::new(Vec::new(), contract.columns().map(str::to_string))
    });
    info!(
        files = files.len(),
        workers,
        rows = table.len(),
        duration_ms = start.elapsed().as_millis(),
        "read shard set"
    );
    Ok(ShardSet {
        table,
        fields,
        files: files.len(),
    })
}
