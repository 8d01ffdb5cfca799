//! Row-oriented string table.
//!
//! Every cell is kept as text; an empty cell is a null. Tables are the unit
//! that moves between readers, the join engine and writers.

use std::collections::{BTreeMap, HashSet};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from string literals, mostly for fixtures.
    pub fn from_str_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| ModelError::FieldUnavailable {
                column: name.to_string(),
            })
    }

    /// Cell value by row index and column name; `None` if either is absent.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a str> + use<'a>> {
        let idx = self.column_index(column)?;
        Some(
            self.rows
                .iter()
                .map(move |row| row.get(idx).map_or("", String::as_str)),
        )
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Appends the rows of `other`, aligning columns by name.
    ///
    /// Columns missing from `other` become empty cells. Columns that exist only
    /// in `other` are an error.
    pub fn append(&mut self, other: Table) -> Result<()> {
        if other.headers == self.headers {
            self.rows.extend(other.rows);
            return Ok(());
        }
        let mapping = self
            .headers
            .iter()
            .map(|header| other.column_index(header))
            .collect::<Vec<_>>();
        let mapped = mapping.iter().flatten().count();
        if mapped != other.headers.len() {
            return Err(ModelError::HeaderMismatch {
                expected: self.headers.clone(),
                actual: other.headers,
            });
        }
        for row in other.rows {
            let aligned = mapping
                .iter()
                .map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                .collect();
            self.rows.push(aligned);
        }
        Ok(())
    }

    /// Renames a column in place. Unknown names are ignored.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.headers[idx] = to.to_string();
        }
    }

    /// Keeps only the listed columns that exist, in the listed order.
    pub fn project(&self, columns: &[&str]) -> Table {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|column| self.column_index(column))
            .collect();
        Table {
            headers: indices.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    /// Reorders columns lexicographically by name.
    pub fn sort_columns(&mut self) {
        let mut order: Vec<usize> = (0..self.headers.len()).collect();
        order.sort_by(|&a, &b| self.headers[a].cmp(&self.headers[b]));
        self.headers = order.iter().map(|&i| self.headers[i].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&i| std::mem::take(&mut row[i])).collect();
        }
    }

    /// Sorts rows by the given key columns, then by the full row.
    pub fn sort_rows_by(&mut self, keys: &[&str]) {
        let key_idx: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.column_index(key))
            .collect();
        self.rows.sort_by(|a, b| {
            key_idx
                .iter()
                .map(|&i| a[i].cmp(&b[i]))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.cmp(b))
        });
    }

    /// Drops exact duplicate rows, keeping the first occurrence.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Keeps the first row per distinct value of `columns`.
    pub fn dedup_by(&mut self, columns: &[&str]) -> Result<usize> {
        let indices = columns
            .iter()
            .map(|column| self.require_column(column))
            .collect::<Result<Vec<_>>>()?;
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| {
            let key: Vec<&str> = indices.iter().map(|&i| row[i].as_str()).collect();
            seen.insert(key.join("\u{1f}"))
        });
        Ok(before - self.rows.len())
    }

    /// Counts empty cells per column.
    pub fn null_counts(&self) -> BTreeMap<String, u64> {
        let mut counts: BTreeMap<String, u64> =
            self.headers.iter().map(|h| (h.clone(), 0)).collect();
        for row in &self.rows {
            for (header, cell) in self.headers.iter().zip(row) {
                if cell.is_empty()
                    && let Some(count) = counts.get_mut(header)
                {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Number of distinct non-empty values in a column.
    pub fn unique_count(&self, column: &str) -> Option<usize> {
        let values = self.column_values(column)?;
        Some(
            values
                .filter(|value| !value.is_empty())
                .collect::<HashSet<_>>()
                .len(),
        )
    }
}
