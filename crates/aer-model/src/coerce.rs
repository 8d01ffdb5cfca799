//! Identifier coercion and the rejected-rows side channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::options::CoercionPolicy;

/// Outcome of coercing one cell to an integer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coerced {
    Value(i64),
    /// Blank or null token; not a data-quality failure.
    Empty,
    Rejected,
}

/// Parses an integer identifier, accepting integral float renderings.
pub fn parse_numeric_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        Some(value as i64)
    } else {
        None
    }
}

pub fn coerce_id(raw: &str) -> Coerced {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return Coerced::Empty;
    }
    match parse_numeric_id(trimmed) {
        Some(value) => Coerced::Value(value),
        None => Coerced::Rejected,
    }
}

/// Count and bounded sample of rejected values for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRows {
    pub count: u64,
    pub sample: Vec<String>,
}

impl RejectedRows {
    pub fn record(&mut self, value: &str, sample_limit: usize) {
        self.count += 1;
        if self.sample.len() < sample_limit && !self.sample.iter().any(|s| s == value) {
            self.sample.push(value.to_string());
        }
    }

    pub fn merge(&mut self, other: &RejectedRows, sample_limit: usize) {
        self.count += other.count;
        for value in &other.sample {
            if self.sample.len() >= sample_limit {
                break;
            }
            if !self.sample.contains(value) {
                self.sample.push(value.clone());
            }
        }
    }
}

/// Rejected rows keyed by `table.column` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectedLedger {
    scopes: BTreeMap<String, RejectedRows>,
}

impl RejectedLedger {
    /// Applies the coercion policy to a rejected value.
    ///
    /// Under [`CoercionPolicy::Fail`] this returns an error naming the scope
    /// and value; under [`CoercionPolicy::DropAndCount`] the value is recorded
    /// and the caller drops the row.
    pub fn reject(
        &mut self,
        scope: &str,
        value: &str,
        policy: CoercionPolicy,
        sample_limit: usize,
    ) -> Result<()> {
        match policy {
            CoercionPolicy::Fail => Err(ModelError::CoercionFailed {
                scope: scope.to_string(),
                value: value.to_string(),
            }),
            CoercionPolicy::DropAndCount => {
                self.scopes
                    .entry(scope.to_string())
                    .or_default()
                    .record(value, sample_limit);
                Ok(())
            }
        }
    }

    pub fn merge(&mut self, other: &RejectedLedger, sample_limit: usize) {
        for (scope, rows) in &other.scopes {
            self.scopes
                .entry(scope.clone())
                .or_default()
                .merge(rows, sample_limit);
        }
    }

    pub fn get(&self, scope: &str) -> Option<&RejectedRows> {
        self.scopes.get(scope)
    }

    pub fn total(&self) -> u64 {
        self.scopes.values().map(|rows| rows.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RejectedRows)> {
        self.scopes.iter().map(|(scope, rows)| (scope.as_str(), rows))
    }
}
