//! Drug product → active ingredient resolution.

use std::collections::{BTreeMap, BTreeSet};

use aer_model::{ConceptId, concept_class, vocabulary};

use crate::store::VocabularyStore;
use crate::traversal::{RelationshipResolver, Resolution, Step, StepDecision, StopPredicate};

/// Accepts ingredient-class destinations whose class differs from the origin.
///
/// Destinations outside the configured vocabulary (or non-standard ones when
/// `standard_only` is set) are pruned, as are ingredients that cannot be
/// accepted, so traversal never walks through one ingredient into another.
#[derive(Debug, Clone)]
struct IngredientPredicate {
    vocabulary_id: Option<String>,
    standard_only: bool,
}

impl StopPredicate for IngredientPredicate {
    fn decide(&self, step: &Step<'_>) -> StepDecision {
        let destination = step.destination;
        if let Some(vocabulary_id) = &self.vocabulary_id
            && !destination.in_vocabulary(vocabulary_id)
        {
            return StepDecision::Prune;
        }
        if self.standard_only && !destination.is_standard() {
            return StepDecision::Prune;
        }
        if destination.is_class(concept_class::INGREDIENT) {
            if step.origin.concept_class_id != destination.concept_class_id {
                StepDecision::Accept
            } else {
                StepDecision::Prune
            }
        } else {
            StepDecision::Expand
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngredientResolver<'s> {
    resolver: RelationshipResolver<'s>,
    predicate: IngredientPredicate,
}

impl<'s> IngredientResolver<'s> {
    /// Resolver scoped to standard RxNorm concepts.
    ///
    /// A concept table without `standard_concept` flags leaves every concept
    /// eligible.
    pub fn new(store: &'s VocabularyStore, max_hops: usize) -> Self {
        Self {
            resolver: RelationshipResolver::new(store, max_hops),
            predicate: IngredientPredicate {
                vocabulary_id: Some(vocabulary::RXNORM.to_string()),
                standard_only: store.has_standard_flags(),
            },
        }
    }

    /// Restricts traversal to one vocabulary; `None` walks across all.
    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary_id: Option<&str>) -> Self {
        self.predicate.vocabulary_id = vocabulary_id.map(str::to_string);
        self
    }

    /// Only has an effect when the store carries standard flags.
    #[must_use]
    pub fn standard_only(mut self, enable: bool) -> Self {
        self.predicate.standard_only = enable && self.resolver.store().has_standard_flags();
        self
    }

    /// Ingredient resolutions of one product, nearest first.
    pub fn resolve_one(&self, product: ConceptId) -> Vec<Resolution> {
        self.resolver.resolve_one(product, &self.predicate)
    }

    /// Ingredient ids of one product in ascending order.
    pub fn ingredients(&self, product: ConceptId) -> BTreeSet<ConceptId> {
        self.resolve_one(product)
            .into_iter()
            .map(|resolution| resolution.target)
            .collect()
    }

    /// Ingredient sets of every product that resolves to at least one.
    pub fn resolve(&self, products: &BTreeSet<ConceptId>) -> BTreeMap<ConceptId, BTreeSet<ConceptId>> {
        self.resolver
            .resolve(products, &self.predicate)
            .into_iter()
            .map(|(product, hits)| (product, hits.into_iter().map(|r| r.target).collect()))
            .collect()
    }
}
