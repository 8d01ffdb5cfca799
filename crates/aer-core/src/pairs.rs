//! Drug ingredient × reaction pairs per report, joined to the baseline.

use std::path::Path;
use std::time::Instant;

use tracing::{info, info_span, warn};

use aer_join::{JoinError, JoinInput, StreamingJoin};
use aer_model::{ColumnContract, JoinType, REPORT_KEY_COLUMN, Table};
use aer_report::{KeyCounter, PairEstimates, StageStats, TableWriter};

use crate::baseline::BASELINE_TABLE;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::stage::{Stage, StageOutcome};

const STAGE: &str = "pairs";

pub const PAIRS_TABLE: &str = "report_drug_reaction_pairs";

/// Row order of the pair table.
const PAIR_ORDER: [&str; 3] = [REPORT_KEY_COLUMN, "ingredient_concept_id", "soc_concept_id"];

/// Streams the report keys of a table into a per-key row counter.
fn count_keys(ctx: &PipelineContext, path: &Path) -> Result<KeyCounter> {
    let mut reader =
        ctx.open_output_with(STAGE, path, ColumnContract::new([REPORT_KEY_COLUMN]))?;
    let mut counter = KeyCounter::new();
    while let Some(chunk) = reader.next_chunk()? {
        for row in &chunk.rows {
            counter.add(&row[0]);
        }
    }
    Ok(counter)
}

/// Materializes the pair table under `<out>/processed/`.
pub fn materialize_pairs(ctx: &PipelineContext) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = STAGE).entered();
    let start = Instant::now();

    let mut baseline_join = ctx.options.engine.join_type;
    if baseline_join == JoinType::Outer {
        warn!("outer baseline join would emit pairs without mentions; using left");
        baseline_join = JoinType::Left;
    }

    let drugs_path = ctx.standard_table("drug_mentions_resolved");
    let reactions_path = ctx.standard_table("reaction_mentions_resolved");
    let baseline_path = ctx.baseline_dir().join(format!("{BASELINE_TABLE}.csv.gz"));

    let raw_drugs = count_keys(ctx, &ctx.er_table("drugcharacteristics"))?;
    let raw_reactions = count_keys(ctx, &ctx.er_table("reactions"))?;
    let drugs = count_keys(ctx, &drugs_path)?;
    let reactions = count_keys(ctx, &reactions_path)?;
    let estimates = PairEstimates {
        pairs_pre_resolution: raw_drugs.product_sum(&raw_reactions),
        pairs_after_ingredient: drugs.product_sum(&raw_reactions),
        pairs_after_reaction: drugs.product_sum(&reactions),
    };
    let baseline_rows = count_keys(ctx, &baseline_path)?.total();

    let mut stats = StageStats::new(Stage::Pairs.as_str())
        .with_join_type(baseline_join)
        .with_pair_estimates(estimates);
    stats.record_input("drug_mentions_resolved", drugs.total(), Some(&drugs_path));
    stats.record_input(
        "reaction_mentions_resolved",
        reactions.total(),
        Some(&reactions_path),
    );
    stats.record_input(BASELINE_TABLE, baseline_rows, Some(&baseline_path));

    let join = StreamingJoin::new(ctx.join_spec())
        .with_input(
            JoinInput::new(
                "drug_mentions_resolved",
                REPORT_KEY_COLUMN,
                ctx.open_output(STAGE, &drugs_path)?,
            )
            .with_size_hint(drugs.total()),
        )
        .with_input(
            JoinInput::new(
                "reaction_mentions_resolved",
                REPORT_KEY_COLUMN,
                ctx.open_output(STAGE, &reactions_path)?,
            )
            .with_size_hint(reactions.total()),
        )
        .with_input(
            JoinInput::new(
                BASELINE_TABLE,
                REPORT_KEY_COLUMN,
                ctx.open_output(STAGE, &baseline_path)?,
            )
            .with_join_type(baseline_join)
            .with_size_hint(baseline_rows),
        );

    let path = ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz"));
    let headers = join.output_headers()?;
    let mut writer = TableWriter::create(&path, headers, &PAIR_ORDER)?.track_nulls(&PAIR_ORDER);
    let mut reports = KeyCounter::new();
    let mut ingredients = KeyCounter::new();
    let mut categories = KeyCounter::new();
    let mut sink = |chunk: Table| {
        for (counter, column) in [
            (&mut reports, REPORT_KEY_COLUMN),
            (&mut ingredients, "ingredient_concept_id"),
            (&mut categories, "soc_concept_id"),
        ] {
            if let Some(values) = chunk.column_values(column) {
                values.for_each(|value| counter.add(value));
            }
        }
        writer.write_chunk(&chunk).map_err(JoinError::sink)
    };
    let report = join.run(&mut sink)?;
    let written = writer.finish()?;

    stats.record_output(PAIRS_TABLE, &written);
    for (label, counter) in [
        ("reports", &reports),
        ("ingredients", &ingredients),
        ("top_level_categories", &categories),
    ] {
        stats.unique_counts.insert(label.to_string(), counter.len() as u64);
    }
    stats.insert_extra("join", &report);
    info!(
        rows = written.rows,
        pairs_pre_resolution = estimates.pairs_pre_resolution,
        pairs_after_reaction = estimates.pairs_after_reaction,
        reports = reports.len(),
        duration_ms = start.elapsed().as_millis(),
        "materialized pairs"
    );
    StageOutcome::finish(ctx, Stage::Pairs, stats)
}
