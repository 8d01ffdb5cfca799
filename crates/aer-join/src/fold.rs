//! Per-key combination of join inputs.
//!
//! For one key, the rows of every input are folded left to right. The first
//! input seeds the accumulator; each further input is combined with the
//! accumulated rows according to its join type. Rows never carry the key
//! itself: the caller prepends it when emitting.

use aer_model::JoinType;

use crate::index::Row;

/// Rows and layout of one input for a single key.
#[derive(Debug, Clone, Copy)]
pub struct KeyRows<'a> {
    pub rows: &'a [Row],
    pub width: usize,
    pub join_type: JoinType,
}

/// Folds the per-key rows of every input into output rows.
///
/// When the accumulator is empty, an outer input re-seeds it with its own
/// rows padded on the left. `revive` controls whether that is allowed: a key
/// already emitted in an earlier driver chunk has produced those rows once
/// and must not produce them again.
pub fn fold_key(inputs: &[KeyRows<'_>], revive: bool) -> Vec<Row> {
    let Some((first, rest)) = inputs.split_first() else {
        return Vec::new();
    };
    let mut acc: Vec<Row> = first.rows.to_vec();
    let mut width = first.width;
    for side in rest {
        acc = match (acc.is_empty(), side.rows.is_empty()) {
            (true, false) if revive && side.join_type == JoinType::Outer => side
                .rows
                .iter()
                .map(|row| padded(width, row))
                .collect(),
            (true, _) => Vec::new(),
            (false, true) => match side.join_type {
                JoinType::Inner => Vec::new(),
                JoinType::Left | JoinType::Outer => acc
                    .into_iter()
                    .map(|mut row| {
                        row.resize(width + side.width, String::new());
                        row
                    })
                    .collect(),
            },
            (false, false) => {
                let mut product = Vec::with_capacity(acc.len() * side.rows.len());
                for left in &acc {
                    for right in side.rows {
                        let mut row = Vec::with_capacity(width + side.width);
                        row.extend_from_slice(left);
                        row.extend_from_slice(right);
                        product.push(row);
                    }
                }
                product
            }
        };
        width += side.width;
    }
    acc
}

fn padded(width: usize, row: &[String]) -> Row {
    let mut out = vec![String::new(); width];
    out.extend_from_slice(row);
    out
}
