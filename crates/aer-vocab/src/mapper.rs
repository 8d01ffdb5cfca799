//! Exact one-hop mapping of codes and names onto concepts.
//!
//! Text reaching this mapper has already been cleaned upstream; the only
//! normalization here is case folding and whitespace collapsing. There is no
//! approximate matching.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use aer_model::{Concept, ConceptId, parse_numeric_id};

use crate::store::VocabularyStore;

/// Lowercases and collapses whitespace; blank input has no key.
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Inserts `id` unless `key` is taken; true when taken by another id.
fn keep_first<K: Hash + Eq>(map: &mut HashMap<K, ConceptId>, key: K, id: ConceptId) -> bool {
    match map.entry(key) {
        Entry::Occupied(existing) => *existing.get() != id,
        Entry::Vacant(slot) => {
            slot.insert(id);
            false
        }
    }
}

/// Code and name lookups within one vocabulary+class partition.
///
/// When several concepts share a code or normalized name, the lowest concept
/// id wins and the collision is counted.
#[derive(Debug)]
pub struct ConceptMapper<'s> {
    store: &'s VocabularyStore,
    by_numeric_code: HashMap<i64, ConceptId>,
    by_code: HashMap<String, ConceptId>,
    by_name: HashMap<String, ConceptId>,
    collisions: u64,
}

impl<'s> ConceptMapper<'s> {
    pub fn new(
        store: &'s VocabularyStore,
        vocabulary_id: &str,
        concept_class_id: Option<&str>,
    ) -> Self {
        let mut mapper = Self {
            store,
            by_numeric_code: HashMap::new(),
            by_code: HashMap::new(),
            by_name: HashMap::new(),
            collisions: 0,
        };
        // `filter` yields ascending ids, so the first insert is the lowest id.
        for concept in store.filter(vocabulary_id, concept_class_id) {
            let id = concept.concept_id;
            let mut collided = false;
            if let Some(code) = parse_numeric_id(&concept.concept_code) {
                collided |= keep_first(&mut mapper.by_numeric_code, code, id);
            }
            collided |= keep_first(&mut mapper.by_code, concept.concept_code.trim().to_string(), id);
            if let Some(name) = normalize_name(&concept.concept_name) {
                collided |= keep_first(&mut mapper.by_name, name, id);
            }
            if collided {
                mapper.collisions += 1;
            }
        }
        mapper
    }

    /// Maps a code: numeric equality for numeric input, exact text otherwise.
    pub fn map_code(&self, code: &str) -> Option<&'s Concept> {
        let id = match parse_numeric_id(code) {
            Some(numeric) => self.by_numeric_code.get(&numeric)?,
            None => self.by_code.get(code.trim())?,
        };
        self.store.concept(*id)
    }

    pub fn map_name(&self, name: &str) -> Option<&'s Concept> {
        let key = normalize_name(name)?;
        self.by_name
            .get(&key)
            .and_then(|id| self.store.concept(*id))
    }

    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// One-hop mapping along relationships into a target vocabulary+class.
///
/// Used for ingredient → ATC 5th classification codes and for
/// MedDRA → SNOMED equivalents.
#[derive(Debug, Clone)]
pub struct ClassificationMapper<'s> {
    store: &'s VocabularyStore,
    vocabulary_id: String,
    concept_class_id: Option<String>,
    relationship_id: Option<String>,
}

impl<'s> ClassificationMapper<'s> {
    pub fn new(
        store: &'s VocabularyStore,
        vocabulary_id: &str,
        concept_class_id: Option<&str>,
    ) -> Self {
        Self {
            store,
            vocabulary_id: vocabulary_id.to_string(),
            concept_class_id: concept_class_id.map(str::to_string),
            relationship_id: None,
        }
    }

    /// Only follows edges of this relationship kind.
    #[must_use]
    pub fn via(mut self, relationship_id: &str) -> Self {
        self.relationship_id = Some(relationship_id.to_string());
        self
    }

    /// Distinct related concepts of `concept_id`, ordered by id.
    pub fn map(&self, concept_id: ConceptId) -> Vec<&'s Concept> {
        let mut related: Vec<&Concept> = self
            .store
            .outgoing(concept_id)
            .iter()
            .filter(|edge| {
                self.relationship_id
                    .as_deref()
                    .is_none_or(|kind| edge.relationship_id == kind)
            })
            .filter_map(|edge| self.store.concept(edge.concept_id_2))
            .filter(|concept| concept.in_vocabulary(&self.vocabulary_id))
            .filter(|concept| {
                self.concept_class_id
                    .as_deref()
                    .is_none_or(|class| concept.is_class(class))
            })
            .collect();
        related.sort_by_key(|concept| concept.concept_id);
        related.dedup_by_key(|concept| concept.concept_id);
        related
    }

    /// Sorted distinct codes of the related concepts.
    pub fn codes(&self, concept_id: ConceptId) -> Vec<String> {
        let mut codes: Vec<String> = self
            .map(concept_id)
            .into_iter()
            .map(|concept| concept.concept_code.clone())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aer_model::Relationship;

    fn store() -> VocabularyStore {
        VocabularyStore::from_parts(
            vec![
                Concept::new(1, "243670", "Aspirin 81 MG Oral Tablet", "Clinical Drug", "RxNorm"),
                Concept::new(2, "1191", "Aspirin", "Ingredient", "RxNorm"),
                Concept::new(3, "1191", "aspirin", "Ingredient", "RxNorm"),
                Concept::new(20, "N02BA01", "acetylsalicylic acid", "ATC 5th", "ATC"),
                Concept::new(21, "B01AC06", "acetylsalicylic acid", "ATC 5th", "ATC"),
                Concept::new(22, "N02BA", "Salicylic acid and derivatives", "ATC 4th", "ATC"),
            ],
            vec![
                Relationship::new(2, 21, "RxNorm - ATC"),
                Relationship::new(2, 20, "RxNorm - ATC"),
                Relationship::new(2, 22, "RxNorm - ATC"),
                Relationship::new(2, 20, "Maps to"),
            ],
        )
    }

    #[test]
    fn maps_codes_numerically_and_names_exactly() {
        let store = store();
        let mapper = ConceptMapper::new(&store, "RxNorm", None);
        assert_eq!(mapper.map_code("243670.0").map(|c| c.concept_id), Some(1));
        assert_eq!(mapper.map_code("1191").map(|c| c.concept_id), Some(2));
        assert_eq!(
            mapper.map_name("  ASPIRIN   81 mg oral TABLET").map(|c| c.concept_id),
            Some(1)
        );
        assert!(mapper.map_name("Aspirin 81mg tab").is_none());
        assert_eq!(mapper.collisions(), 1);
    }

    #[test]
    fn partition_excludes_other_classes() {
        let store = store();
        let mapper = ConceptMapper::new(&store, "RxNorm", Some("Ingredient"));
        assert!(mapper.map_code("243670").is_none());
        assert_eq!(mapper.map_name("aspirin").map(|c| c.concept_id), Some(2));
    }

    #[test]
    fn classification_is_one_hop_and_class_scoped() {
        let store = store();
        let atc = ClassificationMapper::new(&store, "ATC", Some("ATC 5th"));
        assert_eq!(atc.codes(2), vec!["B01AC06", "N02BA01"]);
        assert!(atc.codes(1).is_empty());
        let mapped = atc.clone().via("Maps to").map(2);
        assert_eq!(mapped.iter().map(|c| c.concept_id).collect::<Vec<_>>(), vec![20]);
    }
}
