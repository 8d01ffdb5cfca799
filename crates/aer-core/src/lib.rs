//! Pipeline stages of the adverse-event report pipeline.
//!
//! Every stage reads what earlier stages wrote under the output root,
//! writes its own gzip CSV tables and a JSON statistics file, and returns a
//! [`StageOutcome`]. [`run_all`] chains them in [`Stage::ALL`] order.

pub mod baseline;
pub mod cohort;
pub mod context;
pub mod entities;
pub mod error;
pub mod pairs;
pub mod pipeline;
pub mod qa;
pub mod stage;
pub mod standardize;

pub use baseline::{BASELINE_TABLE, MASTER_AGE_COLUMN, merge_baseline};
pub use cohort::{AgeBand, split_cohorts};
pub use context::PipelineContext;
pub use entities::{entity_names, extract_entities};
pub use error::{CoreError, Result};
pub use pairs::{PAIRS_TABLE, materialize_pairs};
pub use pipeline::{run_all, run_stage};
pub use qa::{quality_reports, quality_reports_with};
pub use stage::{Stage, StageOutcome};
pub use standardize::{
    ConceptExplanation, IngredientHit, Standardizer, standardize, standardize_with,
};
