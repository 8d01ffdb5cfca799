//! Column layout of join inputs and of the joined output.

use std::collections::HashSet;

use aer_model::JoinType;

use crate::error::{JoinError, Result};
use crate::index::Row;

/// Applies `prefix` unless the column already carries it.
pub fn prefixed(prefix: Option<&str>, column: &str) -> String {
    match prefix {
        Some(prefix) if !column.starts_with(prefix) => format!("{prefix}{column}"),
        _ => column.to_string(),
    }
}

/// Where one input keeps its key and value columns.
#[derive(Debug, Clone)]
pub(crate) struct InputLayout {
    pub name: String,
    pub key_index: usize,
    pub value_indices: Vec<usize>,
    /// Output names of the value columns.
    pub value_names: Vec<String>,
    pub join_type: JoinType,
}

impl InputLayout {
    pub fn new(
        name: &str,
        headers: &[String],
        key_column: &str,
        prefix: Option<&str>,
        join_type: JoinType,
    ) -> Result<Self> {
        let key_index = headers
            .iter()
            .position(|header| header == key_column)
            .ok_or_else(|| JoinError::MissingKeyColumn {
                input: name.to_string(),
                column: key_column.to_string(),
            })?;
        let value_indices: Vec<usize> = (0..headers.len()).filter(|&i| i != key_index).collect();
        let value_names = value_indices
            .iter()
            .map(|&i| prefixed(prefix, &headers[i]))
            .collect();
        Ok(Self {
            name: name.to_string(),
            key_index,
            value_indices,
            value_names,
            join_type,
        })
    }

    pub fn width(&self) -> usize {
        self.value_indices.len()
    }

    pub fn key<'r>(&self, row: &'r [String]) -> &'r str {
        row.get(self.key_index).map_or("", String::as_str)
    }

    pub fn values(&self, row: &[String]) -> Row {
        self.value_indices
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or_default())
            .collect()
    }
}

/// Output header: the key column, then every input's value columns in order.
pub(crate) fn output_headers(key_column: &str, layouts: &[InputLayout]) -> Result<Vec<String>> {
    let mut headers = vec![key_column.to_string()];
    let mut seen: HashSet<String> = HashSet::from([key_column.to_string()]);
    for layout in layouts {
        for name in &layout.value_names {
            if !seen.insert(name.clone()) {
                return Err(JoinError::DuplicateColumn {
                    column: name.clone(),
                });
            }
            headers.push(name.clone());
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn prefix_is_not_doubled() {
        assert_eq!(prefixed(Some("patient_"), "patient_sex"), "patient_sex");
        assert_eq!(prefixed(Some("patient_"), "sex"), "patient_sex");
        assert_eq!(prefixed(None, "sex"), "sex");
    }

    #[test]
    fn layout_splits_key_from_values() {
        let layout = InputLayout::new(
            "report",
            &headers(&["receive_date", "safetyreportid", "lastupdate_date"]),
            "safetyreportid",
            Some("report_"),
            JoinType::Inner,
        )
        .unwrap();
        assert_eq!(layout.value_names, vec!["report_receive_date", "report_lastupdate_date"]);
        let row = headers(&["20200101", "R1", "20200301"]);
        assert_eq!(layout.key(&row), "R1");
        assert_eq!(layout.values(&row), vec!["20200101", "20200301"]);
    }

    #[test]
    fn missing_key_and_duplicate_columns_fail() {
        let err = InputLayout::new("x", &headers(&["a"]), "safetyreportid", None, JoinType::Inner)
            .unwrap_err();
        assert!(matches!(err, JoinError::MissingKeyColumn { .. }));

        let a = InputLayout::new("a", &headers(&["k", "v"]), "k", None, JoinType::Inner).unwrap();
        let b = InputLayout::new("b", &headers(&["k", "v"]), "k", None, JoinType::Inner).unwrap();
        assert!(matches!(
            output_headers("k", &[a, b]),
            Err(JoinError::DuplicateColumn { .. })
        ));
    }
}
