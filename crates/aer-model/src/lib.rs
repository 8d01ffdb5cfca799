pub mod coerce;
pub mod concept;
pub mod error;
pub mod fields;
pub mod mention;
pub mod options;
pub mod report_key;
pub mod table;

pub use coerce::{Coerced, RejectedLedger, RejectedRows, coerce_id, parse_numeric_id};
pub use concept::{
    Concept, ConceptId, MEDDRA_SNOMED_EQ, Relationship, concept_class, vocabulary,
};
pub use error::{ModelError, Result};
pub use fields::{ColumnContract, FieldsAvailable};
pub use mention::{
    DrugMention, ReactionMention, ResolvedIngredient, ResolvedPair, TopLevelCategory,
};
pub use options::{
    CoercionPolicy, EngineOptions, JoinType, PipelineOptions, ResolverOptions,
};
pub use report_key::{REPORT_KEY_COLUMN, ReportKey, normalize_report_key};
pub use table::Table;
