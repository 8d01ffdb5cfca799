//! Stage dispatch and full runs.

use std::time::Instant;

use tracing::{info, info_span};

use aer_vocab::VocabularyStore;

use crate::baseline::merge_baseline;
use crate::cohort::split_cohorts;
use crate::context::PipelineContext;
use crate::entities::extract_entities;
use crate::error::Result;
use crate::pairs::materialize_pairs;
use crate::qa::{quality_reports, quality_reports_with};
use crate::stage::{Stage, StageOutcome};
use crate::standardize::{standardize, standardize_with};

/// Runs one stage against whatever earlier stages left under the output root.
pub fn run_stage(ctx: &PipelineContext, stage: Stage) -> Result<StageOutcome> {
    match stage {
        Stage::Entities => extract_entities(ctx),
        Stage::Standardize => standardize(ctx),
        Stage::Baseline => merge_baseline(ctx),
        Stage::Pairs => materialize_pairs(ctx),
        Stage::Qa => quality_reports(ctx),
        Stage::Cohorts => split_cohorts(ctx),
    }
}

fn run_loaded(
    ctx: &PipelineContext,
    stage: Stage,
    store: &VocabularyStore,
) -> Result<StageOutcome> {
    match stage {
        Stage::Standardize => standardize_with(ctx, store),
        Stage::Qa => quality_reports_with(ctx, store),
        other => run_stage(ctx, other),
    }
}

/// Runs every stage in order, loading the vocabulary once.
pub fn run_all(ctx: &PipelineContext) -> Result<Vec<StageOutcome>> {
    let _span = info_span!("pipeline").entered();
    let start = Instant::now();
    ctx.options.validate()?;
    let store = ctx.load_vocabulary()?;
    let mut outcomes = Vec::with_capacity(Stage::ALL.len());
    for stage in Stage::ALL {
        outcomes.push(run_loaded(ctx, stage, &store)?);
    }
    info!(
        stages = outcomes.len(),
        duration_ms = start.elapsed().as_millis(),
        "pipeline finished"
    );
    Ok(outcomes)
}
