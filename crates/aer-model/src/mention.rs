//! Drug and reaction mentions and the pairs built from them.

use serde::{Deserialize, Serialize};

use crate::concept::ConceptId;
use crate::report_key::{REPORT_KEY_COLUMN, ReportKey};
use crate::table::Table;

/// An active ingredient resolved for a drug mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIngredient {
    pub concept_id: ConceptId,
    pub name: String,
    /// Classification codes (ATC 5th).
    pub classification_codes: Vec<String>,
}

/// One drug product reported on one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugMention {
    pub report_key: ReportKey,
    pub product: String,
    pub product_concept: Option<ConceptId>,
    pub ingredients: Vec<ResolvedIngredient>,
}

impl DrugMention {
    pub const COLUMNS: [&'static str; 6] = [
        REPORT_KEY_COLUMN,
        "medicinal_product",
        "rxnorm_concept_id",
        "ingredient_concept_id",
        "ingredient_name",
        "atc_codes",
    ];

    pub fn headers() -> Vec<String> {
        Self::COLUMNS.iter().map(|c| (*c).to_string()).collect()
    }

    pub fn is_resolved(&self) -> bool {
        !self.ingredients.is_empty()
    }

    /// One row per ingredient; unresolved mentions produce none.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let product_concept = self
            .product_concept
            .map(|id| id.to_string())
            .unwrap_or_default();
        self.ingredients
            .iter()
            .map(|ingredient| {
                vec![
                    self.report_key.to_string(),
                    self.product.clone(),
                    product_concept.clone(),
                    ingredient.concept_id.to_string(),
                    ingredient.name.clone(),
                    ingredient.classification_codes.join(";"),
                ]
            })
            .collect()
    }
}

/// Top-level category reached by hierarchy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelCategory {
    pub concept_id: ConceptId,
    pub code: String,
    pub name: String,
}

/// One reaction term reported on one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionMention {
    pub report_key: ReportKey,
    pub reaction: String,
    pub term_concept: Option<ConceptId>,
    pub term_code: Option<String>,
    pub top_level: Option<TopLevelCategory>,
}

impl ReactionMention {
    pub const COLUMNS: [&'static str; 7] = [
        REPORT_KEY_COLUMN,
        "reaction_meddrapt",
        "pt_concept_id",
        "pt_code",
        "soc_concept_id",
        "soc_code",
        "soc_name",
    ];

    pub fn headers() -> Vec<String> {
        Self::COLUMNS.iter().map(|c| (*c).to_string()).collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.term_concept.is_some()
    }

    /// Row for resolved terms; the top-level columns stay empty when the term
    /// has no path to the top level.
    pub fn to_row(&self) -> Option<Vec<String>> {
        let term = self.term_concept?;
        let (soc_id, soc_code, soc_name) = match &self.top_level {
            Some(top) => (top.concept_id.to_string(), top.code.clone(), top.name.clone()),
            None => Default::default(),
        };
        Some(vec![
            self.report_key.to_string(),
            self.reaction.clone(),
            term.to_string(),
            self.term_code.clone().unwrap_or_default(),
            soc_id,
            soc_code,
            soc_name,
        ])
    }
}

/// One drug ingredient × reaction pair of a report, as read back from the
/// materialized pair table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedPair {
    pub report_key: String,
    pub ingredient_id: ConceptId,
    pub top_level_id: Option<ConceptId>,
    pub product: String,
    pub reaction: String,
}

impl ResolvedPair {
    /// Reads every row of a pair table; rows without an ingredient are skipped.
    pub fn from_table(table: &Table) -> Vec<ResolvedPair> {
        let idx = |name: &str| table.column_index(name);
        let (Some(key), Some(ingredient), Some(top), Some(product), Some(reaction)) = (
            idx(REPORT_KEY_COLUMN),
            idx("ingredient_concept_id"),
            idx("soc_concept_id"),
            idx("medicinal_product"),
            idx("reaction_meddrapt"),
        ) else {
            return Vec::new();
        };
        table
            .rows
            .iter()
            .filter_map(|row| {
                Some(ResolvedPair {
                    report_key: row[key].clone(),
                    ingredient_id: row[ingredient].parse().ok()?,
                    top_level_id: row[top].parse().ok(),
                    product: row[product].clone(),
                    reaction: row[reaction].clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ReportKey {
        ReportKey::parse(raw).expect("key")
    }

    #[test]
    fn drug_rows_expand_per_ingredient() {
        let mention = DrugMention {
            report_key: key("R1"),
            product: "Combo".to_string(),
            product_concept: Some(7),
            ingredients: vec![
                ResolvedIngredient {
                    concept_id: 2,
                    name: "A".to_string(),
                    classification_codes: vec!["N02BA01".to_string(), "B01AC06".to_string()],
                },
                ResolvedIngredient {
                    concept_id: 3,
                    name: "B".to_string(),
                    classification_codes: Vec::new(),
                },
            ],
        };
        let rows = mention.to_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][5], "N02BA01;B01AC06");
        assert_eq!(rows[1][3], "3");
    }

    #[test]
    fn unresolved_reaction_has_no_row() {
        let mention = ReactionMention {
            report_key: key("R1"),
            reaction: "Unknown".to_string(),
            term_concept: None,
            term_code: None,
            top_level: None,
        };
        assert!(mention.to_row().is_none());
    }

    #[test]
    fn pairs_read_back_from_table() {
        let table = Table::from_str_rows(
            &[
                "medicinal_product",
                "ingredient_concept_id",
                "reaction_meddrapt",
                "safetyreportid",
                "soc_concept_id",
            ],
            &[&["Aspirin 81mg", "2", "Headache", "R1", "13"], &["X", "", "Y", "R2", ""]],
        );
        let pairs = ResolvedPair::from_table(&table);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].ingredient_id, 2);
        assert_eq!(pairs[0].top_level_id, Some(13));
    }
}
