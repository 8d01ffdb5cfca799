//! Whole-table hash join, used as the reference the streaming engine must
//! agree with and for inputs small enough to join directly.

use std::collections::{HashMap, HashSet};

use aer_model::{JoinType, Table, normalize_report_key};

use crate::error::Result;
use crate::index::Row;
use crate::layout::{InputLayout, output_headers};

/// One fully materialized join input.
#[derive(Debug, Clone)]
pub struct MemoryInput {
    pub name: String,
    pub table: Table,
    pub key_column: String,
    pub prefix: Option<String>,
    pub join_type: JoinType,
}

impl MemoryInput {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
            key_column: key_column.into(),
            prefix: None,
            join_type: JoinType::Inner,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }
}

/// Joins `inputs` pairwise from left to right on their normalized keys.
///
/// Rows with an absent key are dropped. Output columns are laid out exactly
/// as the streaming engine lays them out.
pub fn hash_join(key_column: &str, inputs: &[MemoryInput]) -> Result<Table> {
    let layouts = inputs
        .iter()
        .map(|input| {
            InputLayout::new(
                &input.name,
                &input.table.headers,
                &input.key_column,
                input.prefix.as_deref(),
                input.join_type,
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let headers = output_headers(key_column, &layouts)?;

    let keyed = |input: &MemoryInput, layout: &InputLayout| -> Vec<(String, Row)> {
        input
            .table
            .rows
            .iter()
            .filter_map(|row| normalize_report_key(layout.key(row)).map(|key| (key, layout.values(row))))
            .collect()
    };

    let Some((first, rest)) = inputs.split_first() else {
        return Ok(Table::new(headers));
    };
    let mut acc = keyed(first, &layouts[0]);
    let mut width = layouts[0].width();

    for (input, layout) in rest.iter().zip(&layouts[1..]) {
        let side = keyed(input, layout);
        let mut by_key: HashMap<&str, Vec<&Row>> = HashMap::new();
        for (key, row) in &side {
            by_key.entry(key.as_str()).or_default().push(row);
        }

        let mut next = Vec::new();
        for (key, left) in &acc {
            match by_key.get(key.as_str()) {
                Some(matches) => {
                    for right in matches {
                        let mut row = left.clone();
                        row.extend(right.iter().cloned());
                        next.push((key.clone(), row));
                    }
                }
                None if layout.join_type != JoinType::Inner => {
                    let mut row = left.clone();
                    row.resize(width + layout.width(), String::new());
                    next.push((key.clone(), row));
                }
                None => {}
            }
        }
        if layout.join_type == JoinType::Outer {
            let acc_keys: HashSet<&str> = acc.iter().map(|(key, _)| key.as_str()).collect();
            for (key, right) in &side {
                if !acc_keys.contains(key.as_str()) {
                    let mut row = vec![String::new(); width];
                    row.extend(right.iter().cloned());
                    next.push((key.clone(), row));
                }
            }
        }
        acc = next;
        width += layout.width();
    }

    let rows = acc
        .into_iter()
        .map(|(key, row)| {
            let mut full = Vec::with_capacity(row.len() + 1);
            full.push(key);
            full.extend(row);
            full
        })
        .collect();
    Ok(Table::with_rows(headers, rows))
}
