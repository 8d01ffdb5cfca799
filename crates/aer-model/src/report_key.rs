//! Report key normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column that carries the report key in every entity table.
pub const REPORT_KEY_COLUMN: &str = "safetyreportid";

const NULL_TOKENS: [&str; 3] = ["nan", "null", "none"];

/// Normalized identifier of one adverse-event report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportKey(String);

impl ReportKey {
    /// Parses a raw cell value, returning `None` for absent keys.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_report_key(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw report key.
///
/// Keys exported through floating point columns pick up a trailing `.0`
/// (`"10003.0"`); an all-zero fraction after an all-digit integer part is
/// stripped. Blank cells and null tokens yield `None`.
pub fn normalize_report_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    if trimmed.is_empty()
        || NULL_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return None;
    }
    if let Some((integer, fraction)) = trimmed.split_once('.')
        && !integer.is_empty()
        && !fraction.is_empty()
        && integer.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b == b'0')
    {
        return Some(integer.to_string());
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_float_artifacts() {
        assert_eq!(normalize_report_key("10003.0").as_deref(), Some("10003"));
        assert_eq!(normalize_report_key(" 10003.000 ").as_deref(), Some("10003"));
        assert_eq!(normalize_report_key("10003").as_deref(), Some("10003"));
    }

    #[test]
    fn keeps_meaningful_fractions_and_text() {
        assert_eq!(normalize_report_key("12.5").as_deref(), Some("12.5"));
        assert_eq!(normalize_report_key("US-12.0").as_deref(), Some("US-12.0"));
        assert_eq!(normalize_report_key("12.").as_deref(), Some("12."));
        assert_eq!(normalize_report_key("NA").as_deref(), Some("NA"));
    }

    #[test]
    fn blank_and_null_tokens_are_absent() {
        assert_eq!(normalize_report_key(""), None);
        assert_eq!(normalize_report_key("   "), None);
        assert_eq!(normalize_report_key("NaN"), None);
        assert_eq!(normalize_report_key("null"), None);
        assert_eq!(normalize_report_key("None"), None);
    }

    #[test]
    fn report_key_displays_normalized_value() {
        let key = ReportKey::parse("42.0").expect("key");
        assert_eq!(key.to_string(), "42");
        assert_eq!(key.as_str(), "42");
    }
}
