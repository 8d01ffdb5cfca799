//! Vocabulary store, graph resolvers and concept mapping.

pub mod error;
pub mod hierarchy;
pub mod ingredient;
pub mod mapper;
pub mod snapshot;
pub mod store;
pub mod traversal;

pub use error::{Result, VocabError};
pub use hierarchy::{HierarchyPath, HierarchyResolver};
pub use ingredient::IngredientResolver;
pub use mapper::{ClassificationMapper, ConceptMapper, normalize_name};
pub use snapshot::{ConceptSnapshot, read_snapshot, write_snapshot};
pub use store::{LoadOptions, VocabularyStats, VocabularyStore};
pub use traversal::{RelationshipResolver, Resolution, Step, StepDecision, StopPredicate};
