//! Vocabulary nodes and edges.
//!
//! A vocabulary snapshot is a node table of [`Concept`]s and a directed edge
//! table of [`Relationship`]s spanning several terminologies (RxNorm, MedDRA,
//! ATC, SNOMED). Both are immutable once loaded.

use serde::{Deserialize, Serialize};

/// Integer surrogate key of a concept.
pub type ConceptId = i64;

/// Well-known `vocabulary_id` values.
pub mod vocabulary {
    pub const RXNORM: &str = "RxNorm";
    pub const MEDDRA: &str = "MedDRA";
    pub const ATC: &str = "ATC";
    pub const SNOMED: &str = "SNOMED";
}

/// Well-known `concept_class_id` values.
pub mod concept_class {
    pub const INGREDIENT: &str = "Ingredient";
    pub const ATC_5TH: &str = "ATC 5th";
    pub const PT: &str = "PT";
    pub const HLT: &str = "HLT";
    pub const HLGT: &str = "HLGT";
    pub const SOC: &str = "SOC";

    /// MedDRA levels from preferred term to system organ class.
    pub const MEDDRA_LEVELS: [&str; 4] = [PT, HLT, HLGT, SOC];
}

/// Relationship kind linking a MedDRA term to its SNOMED equivalent.
pub const MEDDRA_SNOMED_EQ: &str = "MedDRA - SNOMED eq";

/// A vocabulary node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: ConceptId,
    /// Vocabulary-native code (RxCUI, MedDRA code, ATC code, ...).
    pub concept_code: String,
    pub concept_name: String,
    pub concept_class_id: String,
    pub vocabulary_id: String,
    /// `"S"` for standard concepts, `"C"` for classification concepts.
    pub standard_concept: Option<String>,
}

impl Concept {
    pub fn new(
        concept_id: ConceptId,
        concept_code: impl Into<String>,
        concept_name: impl Into<String>,
        concept_class_id: impl Into<String>,
        vocabulary_id: impl Into<String>,
    ) -> Self {
        Self {
            concept_id,
            concept_code: concept_code.into(),
            concept_name: concept_name.into(),
            concept_class_id: concept_class_id.into(),
            vocabulary_id: vocabulary_id.into(),
            standard_concept: None,
        }
    }

    #[must_use]
    pub fn with_standard_flag(mut self, flag: impl Into<String>) -> Self {
        let flag = flag.into();
        self.standard_concept = if flag.trim().is_empty() {
            None
        } else {
            Some(flag)
        };
        self
    }

    pub fn is_standard(&self) -> bool {
        self.standard_concept.as_deref() == Some("S")
    }

    pub fn is_class(&self, class: &str) -> bool {
        self.concept_class_id == class
    }

    pub fn in_vocabulary(&self, vocabulary_id: &str) -> bool {
        self.vocabulary_id == vocabulary_id
    }
}

/// A directed vocabulary edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub concept_id_1: ConceptId,
    pub concept_id_2: ConceptId,
    pub relationship_id: String,
}

impl Relationship {
    pub fn new(
        concept_id_1: ConceptId,
        concept_id_2: ConceptId,
        relationship_id: impl Into<String>,
    ) -> Self {
        Self {
            concept_id_1,
            concept_id_2,
            relationship_id: relationship_id.into(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.concept_id_1 == self.concept_id_2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_standard_flag_is_none() {
        let concept = Concept::new(1, "1191", "Aspirin", "Ingredient", "RxNorm")
            .with_standard_flag("  ");
        assert_eq!(concept.standard_concept, None);
        assert!(!concept.is_standard());

        let standard = concept.with_standard_flag("S");
        assert!(standard.is_standard());
    }

    #[test]
    fn detects_self_loops() {
        assert!(Relationship::new(4, 4, "Maps to").is_self_loop());
        assert!(!Relationship::new(4, 5, "Maps to").is_self_loop());
    }
}
