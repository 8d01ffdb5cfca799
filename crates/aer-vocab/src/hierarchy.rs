//! Term → top-level category resolution over a fixed class sequence.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use aer_model::{ConceptId, concept_class, vocabulary};

use crate::error::{Result, VocabError};
use crate::store::VocabularyStore;
use crate::traversal::{RelationshipResolver, Step, StepDecision, StopPredicate};

/// Chosen path from a term to its top-level category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyPath {
    pub term: ConceptId,
    pub top_level: ConceptId,
    pub hops: usize,
    /// Concept at each level, term first.
    pub levels: Vec<ConceptId>,
}

impl HierarchyPath {
    pub fn level(&self, index: usize) -> Option<ConceptId> {
        self.levels.get(index).copied()
    }
}

#[derive(Debug, Clone)]
struct LevelPredicate {
    levels: Vec<String>,
    vocabulary_id: Option<String>,
}

impl LevelPredicate {
    fn level_of(&self, class: &str) -> Option<usize> {
        self.levels.iter().position(|level| level == class)
    }
}

impl StopPredicate for LevelPredicate {
    /// Each step must climb exactly one level with an exact class match;
    /// reaching the last level accepts.
    fn decide(&self, step: &Step<'_>) -> StepDecision {
        if let Some(vocabulary_id) = &self.vocabulary_id
            && !step.destination.in_vocabulary(vocabulary_id)
        {
            return StepDecision::Prune;
        }
        let (Some(from), Some(to)) = (
            self.level_of(&step.source.concept_class_id),
            self.level_of(&step.destination.concept_class_id),
        ) else {
            return StepDecision::Prune;
        };
        if to != from + 1 {
            StepDecision::Prune
        } else if to + 1 == self.levels.len() {
            StepDecision::Accept
        } else {
            StepDecision::Expand
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyResolver<'s> {
    resolver: RelationshipResolver<'s>,
    predicate: LevelPredicate,
}

impl<'s> HierarchyResolver<'s> {
    /// Resolver over an ordered class sequence, term level first.
    pub fn new(store: &'s VocabularyStore, levels: &[String], max_hops: usize) -> Result<Self> {
        if levels.len() < 2 {
            return Err(VocabError::InvalidLevels {
                reason: "at least a term level and a top level are required".to_string(),
            });
        }
        let unique: BTreeSet<&String> = levels.iter().collect();
        if unique.len() != levels.len() {
            return Err(VocabError::InvalidLevels {
                reason: format!("levels must be distinct: {levels:?}"),
            });
        }
        Ok(Self {
            resolver: RelationshipResolver::new(store, max_hops),
            predicate: LevelPredicate {
                levels: levels.to_vec(),
                vocabulary_id: None,
            },
        })
    }

    /// MedDRA PT → HLT → HLGT → SOC.
    pub fn meddra(store: &'s VocabularyStore, max_hops: usize) -> Self {
        Self {
            resolver: RelationshipResolver::new(store, max_hops),
            predicate: LevelPredicate {
                levels: concept_class::MEDDRA_LEVELS
                    .iter()
                    .map(|level| (*level).to_string())
                    .collect(),
                vocabulary_id: Some(vocabulary::MEDDRA.to_string()),
            },
        }
    }

    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary_id: Option<&str>) -> Self {
        self.predicate.vocabulary_id = vocabulary_id.map(str::to_string);
        self
    }

    pub fn levels(&self) -> &[String] {
        &self.predicate.levels
    }

    /// Top-level path of `term`: nearest hop count, then lowest top-level id.
    ///
    /// Terms whose class is not the first level, or with no path to the last
    /// level within the hop bound, have no path.
    pub fn resolve_one(&self, term: ConceptId) -> Option<HierarchyPath> {
        let store = self.resolver.store();
        let concept = store.concept(term)?;
        if self.predicate.level_of(&concept.concept_class_id) != Some(0) {
            return None;
        }
        let best = self
            .resolver
            .resolve_one(term, &self.predicate)
            .into_iter()
            .next()?;
        Some(HierarchyPath {
            term,
            top_level: best.target,
            hops: best.hops,
            levels: best.path,
        })
    }

    pub fn resolve(&self, terms: &BTreeSet<ConceptId>) -> BTreeMap<ConceptId, HierarchyPath> {
        terms
            .iter()
            .filter_map(|&term| self.resolve_one(term).map(|path| (term, path)))
            .collect()
    }
}
