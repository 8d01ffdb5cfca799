//! Baseline merge of the per-report demographic tables.

use std::time::Instant;

use tracing::{info, info_span};

use aer_join::{JoinError, JoinInput, StreamingJoin};
use aer_model::{REPORT_KEY_COLUMN, Table};
use aer_report::{StageStats, TableWriter};

use crate::context::PipelineContext;
use crate::error::Result;
use crate::stage::{Stage, StageOutcome};

const STAGE: &str = "baseline";

pub const BASELINE_TABLE: &str = "patients_report_serious_reporter";

/// Patient age column after prefixing.
pub const MASTER_AGE_COLUMN: &str = "patient_custom_master_age";

/// Entity tables merged into the baseline, with their column prefix.
const MERGED: [(&str, &str); 4] = [
    ("patient", "patient_"),
    ("report", "report_"),
    ("report_serious", "serious_"),
    ("reporter", "reportr_"),
];

/// Joins patient, report, seriousness and reporter tables on the report key.
pub fn merge_baseline(ctx: &PipelineContext) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = STAGE).entered();
    let start = Instant::now();
    let join_type = ctx.options.engine.join_type;
    let mut stats = StageStats::new(Stage::Baseline.as_str()).with_join_type(join_type);

    let mut join = StreamingJoin::new(ctx.join_spec());
    for (position, (name, prefix)) in MERGED.into_iter().enumerate() {
        let path = ctx.er_table(name);
        let reader = ctx.open_output(STAGE, &path)?;
        stats.record_input(name, 0, Some(&path));
        let mut input = JoinInput::new(name, REPORT_KEY_COLUMN, reader).with_prefix(prefix);
        if position > 0 {
            input = input.with_join_type(join_type);
        }
        join = join.with_input(input);
    }

    let path = ctx.baseline_dir().join(format!("{BASELINE_TABLE}.csv.gz"));
    let headers = join.output_headers()?;
    let mut writer = TableWriter::create(&path, headers, &[REPORT_KEY_COLUMN])?
        .track_nulls(&[MASTER_AGE_COLUMN]);
    let mut sink = |chunk: Table| writer.write_chunk(&chunk).map_err(JoinError::sink);
    let report = join.run(&mut sink)?;
    let written = writer.finish()?;

    for (name, rows) in &report.input_rows {
        if let Some(input) = stats.inputs.get_mut(name) {
            input.rows = *rows;
        }
    }
    stats.record_output(BASELINE_TABLE, &written);
    stats.insert_extra("join", &report);
    info!(
        rows = written.rows,
        driver = %report.driver,
        indexed = report.indexed_inputs.len(),
        duration_ms = start.elapsed().as_millis(),
        "merged baseline"
    );
    StageOutcome::finish(ctx, Stage::Baseline, stats)
}
