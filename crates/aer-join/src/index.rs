//! Disposable on-disk key index backed by SQLite.
//!
//! Rows of every spilled join side live in one table keyed by
//! `(side, key, row_id)`, so a batched `IN (...)` lookup returns exactly the
//! rows of a key set in insertion order. Durability is switched off: the index
//! is rebuilt from scratch whenever a stage re-runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, warn};

use crate::error::{JoinError, Result};

/// SQLite's default bound-variable ceiling is 32 766; stay below it.
pub const MAX_BATCH_SIZE: usize = 30_000;

static NEXT_INDEX: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &str = "
CREATE TABLE side_rows (
    side    INTEGER NOT NULL,
    key     TEXT    NOT NULL,
    row_id  INTEGER NOT NULL,
    payload TEXT    NOT NULL,
    PRIMARY KEY (side, key, row_id)
) WITHOUT ROWID;
CREATE TABLE side_keys (
    side INTEGER NOT NULL,
    key  TEXT    NOT NULL,
    PRIMARY KEY (side, key)
) WITHOUT ROWID;
CREATE TABLE seen_keys (
    key TEXT PRIMARY KEY
) WITHOUT ROWID;
";

pub type Row = Vec<String>;

pub struct KeyIndex {
    conn: Connection,
    path: PathBuf,
    batch_size: usize,
    commit_every: usize,
    pending: usize,
    in_transaction: bool,
    next_row_id: i64,
    discarded: bool,
}

impl KeyIndex {
    /// Creates a fresh index file under `dir`.
    pub fn create(dir: &Path, batch_size: usize, commit_every: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|source| JoinError::IndexCreate {
            path: dir.to_path_buf(),
            source,
        })?;
        let sequence = NEXT_INDEX.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("join-{}-{sequence}.sqlite", std::process::id()));
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| JoinError::IndexCreate {
                path: path.clone(),
                source,
            })?;
        }

        let conn = Connection::open(&path).map_err(JoinError::index("open"))?;
        conn.pragma_update_and_check(None, "journal_mode", "OFF", |row| row.get::<_, String>(0))
            .map_err(JoinError::index("set journal_mode"))?;
        conn.pragma_update(None, "synchronous", "OFF")
            .map_err(JoinError::index("set synchronous"))?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(JoinError::index("set temp_store"))?;
        conn.execute_batch(SCHEMA)
            .map_err(JoinError::index("create schema"))?;
        debug!(path = %path.display(), "created join index");

        Ok(Self {
            conn,
            path,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            commit_every: commit_every.max(1),
            pending: 0,
            in_transaction: false,
            next_row_id: 0,
            discarded: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN")
                .map_err(JoinError::index("begin"))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Commits the open write transaction, if any.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn
                .execute_batch("COMMIT")
                .map_err(JoinError::index("commit"))?;
            self.in_transaction = false;
            self.pending = 0;
        }
        Ok(())
    }

    fn count_write(&mut self) -> Result<()> {
        self.pending += 1;
        if self.pending >= self.commit_every {
            self.commit()?;
        }
        Ok(())
    }

    /// Stores one row of `side` under `key`, preserving insertion order.
    pub fn insert_row(&mut self, side: usize, key: &str, row: &[String]) -> Result<()> {
        self.begin()?;
        let payload = serde_json::to_string(row).map_err(|source| JoinError::Payload { source })?;
        let side = side as i64;
        {
            let mut insert_row = self
                .conn
                .prepare_cached("INSERT INTO side_rows (side, key, row_id, payload) VALUES (?1, ?2, ?3, ?4)")
                .map_err(JoinError::index("prepare row insert"))?;
            insert_row
                .execute(params![side, key, self.next_row_id, payload])
                .map_err(JoinError::index("insert row"))?;
            let mut insert_key = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO side_keys (side, key) VALUES (?1, ?2)")
                .map_err(JoinError::index("prepare key insert"))?;
            insert_key
                .execute(params![side, key])
                .map_err(JoinError::index("insert key"))?;
        }
        self.next_row_id += 1;
        self.count_write()
    }

    /// Rows of `side` for each of `keys`, in insertion order per key.
    ///
    /// Keys without rows are absent from the result.
    pub fn fetch_rows(&mut self, side: usize, keys: &[&str]) -> Result<HashMap<String, Vec<Row>>> {
        self.commit()?;
        let mut found: HashMap<String, Vec<Row>> = HashMap::new();
        for batch in keys.chunks(self.batch_size) {
            let sql = format!(
                "SELECT key, payload FROM side_rows WHERE side = {side} AND key IN ({}) ORDER BY row_id",
                placeholders(batch.len())
            );
            let mut stmt = self
                .conn
                .prepare_cached(&sql)
                .map_err(JoinError::index("prepare row lookup"))?;
            let rows = stmt
                .query_map(params_from_iter(batch.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(JoinError::index("row lookup"))?;
            for row in rows {
                let (key, payload) = row.map_err(JoinError::index("read row"))?;
                let cells: Row =
                    serde_json::from_str(&payload).map_err(|source| JoinError::Payload { source })?;
                found.entry(key).or_default().push(cells);
            }
        }
        Ok(found)
    }

    /// Records driver keys; returns those not recorded before, in input order.
    pub fn mark_seen(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        self.begin()?;
        let mut fresh = Vec::new();
        for key in keys {
            let changed = {
                let mut stmt = self
                    .conn
                    .prepare_cached("INSERT OR IGNORE INTO seen_keys (key) VALUES (?1)")
                    .map_err(JoinError::index("prepare seen insert"))?;
                stmt.execute(params![key])
                    .map_err(JoinError::index("insert seen key"))?
            };
            if changed > 0 {
                fresh.push((*key).to_string());
            }
            self.count_write()?;
        }
        Ok(fresh)
    }

    /// Distinct keys of `sides` never marked seen, in ascending order.
    pub fn unseen_keys(&mut self, sides: &[usize]) -> Result<Vec<String>> {
        self.commit()?;
        if sides.is_empty() {
            return Ok(Vec::new());
        }
        let side_list = sides
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT key FROM side_keys WHERE side IN ({side_list}) \
             AND key NOT IN (SELECT key FROM seen_keys) ORDER BY key"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(JoinError::index("prepare leftover query"))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(JoinError::index("leftover query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(JoinError::index("read leftover key"))?;
        Ok(keys)
    }

    /// Subset of `keys` that were never marked seen, in input order.
    pub fn filter_unseen(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        self.commit()?;
        let mut unseen = Vec::new();
        for batch in keys.chunks(self.batch_size) {
            let sql = format!(
                "SELECT key FROM seen_keys WHERE key IN ({})",
                placeholders(batch.len())
            );
            let mut stmt = self
                .conn
                .prepare_cached(&sql)
                .map_err(JoinError::index("prepare seen lookup"))?;
            let seen = stmt
                .query_map(params_from_iter(batch.iter()), |row| row.get::<_, String>(0))
                .map_err(JoinError::index("seen lookup"))?
                .collect::<rusqlite::Result<std::collections::HashSet<_>>>()
                .map_err(JoinError::index("read seen key"))?;
            unseen.extend(
                batch
                    .iter()
                    .filter(|key| !seen.contains(**key))
                    .map(|key| (*key).to_string()),
            );
        }
        Ok(unseen)
    }

    /// Closes the connection and removes the index file.
    pub fn discard(mut self) -> Result<()> {
        self.discarded = true;
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path).map_err(|source| JoinError::IndexCreate { path, source })
    }
}

impl Drop for KeyIndex {
    fn drop(&mut self) {
        if !self.discarded && std::fs::remove_file(&self.path).is_err() {
            warn!(path = %self.path.display(), "failed to remove join index");
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
