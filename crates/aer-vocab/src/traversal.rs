//! Bounded breadth-first traversal of the relationship graph.
//!
//! Every resolver in this crate is one [`RelationshipResolver`] plus a
//! [`StopPredicate`]. Starting from an origin concept, each hop joins the
//! frontier against outgoing edges. The predicate classifies every
//! destination: accepted destinations become results for the origin and are
//! not expanded, expanded destinations join the next frontier, pruned ones
//! are dropped. Traversal stops after `max_hops` hops.
//!
//! Frontiers and adjacency lists are visited in ascending id order, so the
//! result of a traversal depends only on the vocabulary snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use aer_model::{Concept, ConceptId, Relationship};

use crate::store::VocabularyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Destination is a terminal result for the origin.
    Accept,
    /// Destination joins the next frontier.
    Expand,
    /// Destination is neither a result nor traversed further.
    Prune,
}

/// One candidate edge inspected during traversal.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub origin: &'a Concept,
    pub source: &'a Concept,
    pub destination: &'a Concept,
    pub relationship: &'a Relationship,
    /// 1-based hop count of the destination.
    pub hop: usize,
}

pub trait StopPredicate {
    fn decide(&self, step: &Step<'_>) -> StepDecision;
}

impl<F> StopPredicate for F
where
    F: Fn(&Step<'_>) -> StepDecision,
{
    fn decide(&self, step: &Step<'_>) -> StepDecision {
        self(step)
    }
}

/// A concept reached from an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub origin: ConceptId,
    pub target: ConceptId,
    pub hops: usize,
    /// Concept ids from origin to target inclusive.
    pub path: Vec<ConceptId>,
}

#[derive(Debug, Clone, Copy)]
pub struct RelationshipResolver<'s> {
    store: &'s VocabularyStore,
    max_hops: usize,
}

impl<'s> RelationshipResolver<'s> {
    pub fn new(store: &'s VocabularyStore, max_hops: usize) -> Self {
        Self { store, max_hops }
    }

    pub fn store(&self) -> &'s VocabularyStore {
        self.store
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Resolves one origin. Results are ordered by hop count, then target id.
    ///
    /// A target is reported once, at the first hop it is accepted. The
    /// origin is never its own result, and unknown origins resolve to nothing.
    pub fn resolve_one<P: StopPredicate + ?Sized>(
        &self,
        origin: ConceptId,
        predicate: &P,
    ) -> Vec<Resolution> {
        let Some(origin_concept) = self.store.concept(origin) else {
            return Vec::new();
        };

        let mut visited: HashSet<ConceptId> = HashSet::from([origin]);
        let mut parents: HashMap<ConceptId, ConceptId> = HashMap::new();
        let mut accepted: HashSet<ConceptId> = HashSet::new();
        let mut results = Vec::new();
        let mut frontier = vec![origin];

        for hop in 1..=self.max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            let mut hop_hits: Vec<(ConceptId, ConceptId)> = Vec::new();
            for &node in &frontier {
                let Some(source) = self.store.concept(node) else {
                    continue;
                };
                for relationship in self.store.outgoing(node) {
                    let target = relationship.concept_id_2;
                    if target == node || target == origin {
                        continue;
                    }
                    let Some(destination) = self.store.concept(target) else {
                        continue;
                    };
                    let step = Step {
                        origin: origin_concept,
                        source,
                        destination,
                        relationship,
                        hop,
                    };
                    match predicate.decide(&step) {
                        StepDecision::Accept => {
                            if accepted.insert(target) {
                                hop_hits.push((target, node));
                            }
                        }
                        StepDecision::Expand => {
                            if visited.insert(target) {
                                parents.insert(target, node);
                                next.push(target);
                            }
                        }
                        StepDecision::Prune => {}
                    }
                }
            }
            hop_hits.sort_unstable();
            for (target, via) in hop_hits {
                let mut path = trace(&parents, origin, via);
                path.push(target);
                results.push(Resolution {
                    origin,
                    target,
                    hops: hop,
                    path,
                });
            }
            next.sort_unstable();
            frontier = next;
        }
        results
    }

    /// Resolves every origin in ascending id order.
    pub fn resolve<P: StopPredicate + ?Sized>(
        &self,
        origins: &BTreeSet<ConceptId>,
        predicate: &P,
    ) -> BTreeMap<ConceptId, Vec<Resolution>> {
        origins
            .iter()
            .map(|&origin| (origin, self.resolve_one(origin, predicate)))
            .filter(|(_, hits)| !hits.is_empty())
            .collect()
    }
}

/// Walks parent links back from `node` to `origin`, returning origin-first ids.
fn trace(parents: &HashMap<ConceptId, ConceptId>, origin: ConceptId, node: ConceptId) -> Vec<ConceptId> {
    let mut path = vec![node];
    let mut current = node;
    while current != origin {
        match parents.get(&current) {
            Some(&parent) => {
                path.push(parent);
                current = parent;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VocabularyStore {
        let concepts = (1..=6).map(|id| {
            let class = if id >= 5 { "Target" } else { "Node" };
            Concept::new(id, id.to_string(), format!("c{id}"), class, "V")
        });
        let edges = vec![
            Relationship::new(1, 2, "r"),
            Relationship::new(2, 3, "r"),
            Relationship::new(3, 5, "r"),
            Relationship::new(1, 4, "r"),
            Relationship::new(4, 1, "r"),
            Relationship::new(4, 6, "r"),
            Relationship::new(2, 4, "r"),
        ];
        VocabularyStore::from_parts(concepts, edges)
    }

    fn target_class(step: &Step<'_>) -> StepDecision {
        if step.destination.is_class("Target") {
            StepDecision::Accept
        } else {
            StepDecision::Expand
        }
    }

    #[test]
    fn accepts_targets_with_paths() {
        let store = store();
        let resolver = RelationshipResolver::new(&store, 6);
        let hits = resolver.resolve_one(1, &target_class);
        let summary: Vec<_> = hits.iter().map(|r| (r.target, r.hops)).collect();
        assert_eq!(summary, vec![(6, 2), (5, 3)]);
        assert_eq!(hits[0].path, vec![1, 4, 6]);
        assert_eq!(hits[1].path, vec![1, 2, 3, 5]);
    }

    #[test]
    fn respects_hop_bound() {
        let store = store();
        let resolver = RelationshipResolver::new(&store, 2);
        let hits = resolver.resolve_one(1, &target_class);
        assert_eq!(hits.iter().map(|r| r.target).collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn never_returns_origin_through_cycles() {
        let store = store();
        let resolver = RelationshipResolver::new(&store, 6);
        fn accept_all(_: &Step<'_>) -> StepDecision {
            StepDecision::Accept
        }
        let hits = resolver.resolve_one(4, &accept_all);
        assert!(hits.iter().all(|r| r.target != 4));
        assert_eq!(hits.iter().map(|r| r.target).collect::<Vec<_>>(), vec![1, 6]);
    }

    #[test]
    fn unknown_origin_resolves_to_nothing() {
        let store = store();
        let resolver = RelationshipResolver::new(&store, 6);
        assert!(resolver.resolve_one(42, &target_class).is_empty());
        let origins = BTreeSet::from([1, 42]);
        assert_eq!(resolver.resolve(&origins, &target_class).len(), 1);
    }
}
