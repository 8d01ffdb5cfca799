//! Column contracts and the fields-available descriptor.
//!
//! Readers are given a [`ColumnContract`] naming required and optional
//! columns. A missing required column is fatal; missing optional columns
//! narrow the output, and the reader reports exactly what it delivered as a
//! [`FieldsAvailable`] so downstream code can assert on it instead of probing
//! headers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnContract {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl ColumnContract {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: Vec::new(),
        }
    }

    /// A contract that accepts every column the source has.
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_optional<I, S>(mut self, optional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(optional.into_iter().map(Into::into));
        self
    }

    pub fn is_any(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }

    /// Required columns first, then optional ones, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(String::as_str)
    }
}

/// Which contract columns a source actually delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsAvailable {
    present: BTreeSet<String>,
    missing_optional: BTreeSet<String>,
}

impl FieldsAvailable {
    pub fn new<I, J>(present: I, missing_optional: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            present: present.into_iter().collect(),
            missing_optional: missing_optional.into_iter().collect(),
        }
    }

    pub fn has(&self, column: &str) -> bool {
        self.present.contains(column)
    }

    pub fn require(&self, column: &str) -> Result<()> {
        if self.has(column) {
            Ok(())
        } else {
            Err(ModelError::FieldUnavailable {
                column: column.to_string(),
            })
        }
    }

    pub fn present(&self) -> impl Iterator<Item = &str> {
        self.present.iter().map(String::as_str)
    }

    pub fn missing_optional(&self) -> impl Iterator<Item = &str> {
        self.missing_optional.iter().map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_optional.is_empty()
    }

    /// Combines descriptors of several shards of one logical table.
    ///
    /// A column is present when any shard delivered it; rows from shards that
    /// lacked it carry empty cells.
    pub fn merge(&mut self, other: &FieldsAvailable) {
        self.present.extend(other.present.iter().cloned());
        self.missing_optional.extend(other.missing_optional.iter().cloned());
        let present = &self.present;
        self.missing_optional.retain(|column| !present.contains(column));
    }

    /// Renames a present column, keeping the descriptor in step with a table.
    pub fn rename(&mut self, from: &str, to: &str) {
        if self.present.remove(from) {
            self.present.insert(to.to_string());
        }
        if self.missing_optional.remove(from) {
            self.missing_optional.insert(to.to_string());
        }
    }
}
