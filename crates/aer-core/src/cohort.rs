//! NICHD age-band split of the pair table.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span};

use aer_model::{REPORT_KEY_COLUMN, Table};
use aer_report::{StageStats, TableWriter};

use crate::baseline::MASTER_AGE_COLUMN;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::pairs::PAIRS_TABLE;
use crate::stage::{Stage, StageOutcome};

const STAGE: &str = "cohorts";

/// Pediatric development stages by age in years, plus adults and unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    TermNeonatal,
    Infancy,
    Toddler,
    EarlyChildhood,
    MiddleChildhood,
    EarlyAdolescence,
    LateAdolescence,
    Adults,
    Unknown,
}

impl AgeBand {
    pub const ALL: [AgeBand; 9] = [
        AgeBand::TermNeonatal,
        AgeBand::Infancy,
        AgeBand::Toddler,
        AgeBand::EarlyChildhood,
        AgeBand::MiddleChildhood,
        AgeBand::EarlyAdolescence,
        AgeBand::LateAdolescence,
        AgeBand::Adults,
        AgeBand::Unknown,
    ];

    /// Inclusive upper bounds in years.
    const BOUNDS: [(f64, AgeBand); 7] = [
        (1.0 / 12.0, AgeBand::TermNeonatal),
        (1.0, AgeBand::Infancy),
        (2.0, AgeBand::Toddler),
        (5.0, AgeBand::EarlyChildhood),
        (11.0, AgeBand::MiddleChildhood),
        (18.0, AgeBand::EarlyAdolescence),
        (21.0, AgeBand::LateAdolescence),
    ];

    pub fn from_years(age: f64) -> Self {
        if !age.is_finite() || age <= 0.0 {
            return AgeBand::Unknown;
        }
        Self::BOUNDS
            .iter()
            .find(|(upper, _)| age <= *upper)
            .map_or(AgeBand::Adults, |(_, band)| *band)
    }

    /// Band of a raw age cell.
    pub fn classify(raw: &str) -> Self {
        raw.trim()
            .parse::<f64>()
            .map_or(AgeBand::Unknown, Self::from_years)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgeBand::TermNeonatal => "term_neonatal",
            AgeBand::Infancy => "infancy",
            AgeBand::Toddler => "toddler",
            AgeBand::EarlyChildhood => "early_childhood",
            AgeBand::MiddleChildhood => "middle_childhood",
            AgeBand::EarlyAdolescence => "early_adolescence",
            AgeBand::LateAdolescence => "late_adolescence",
            AgeBand::Adults => "adults",
            AgeBand::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streams the pair table into one file per age band.
pub fn split_cohorts(ctx: &PipelineContext) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = STAGE).entered();
    let start = Instant::now();
    let mut stats = StageStats::new(Stage::Cohorts.as_str());

    let pairs_path = ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz"));
    let mut reader = ctx.open_output(STAGE, &pairs_path)?;
    let headers = reader.headers().to_vec();
    let age = headers.iter().position(|h| h == MASTER_AGE_COLUMN);
    if age.is_none() {
        info!(column = MASTER_AGE_COLUMN, "pair table has no age column; every row is unknown");
    }

    let cohorts_dir = ctx.cohorts_dir();
    let mut writers = BTreeMap::new();
    for band in AgeBand::ALL {
        let path = cohorts_dir.join(format!("{band}.csv.gz"));
        let writer = TableWriter::create(&path, headers.iter().cloned(), &[REPORT_KEY_COLUMN])?;
        writers.insert(band, writer);
    }

    let mut rows_in = 0u64;
    while let Some(chunk) = reader.next_chunk()? {
        rows_in += chunk.len() as u64;
        let mut split: BTreeMap<AgeBand, Vec<Vec<String>>> = BTreeMap::new();
        for row in chunk.rows {
            let band = age
                .and_then(|idx| row.get(idx))
                .map_or(AgeBand::Unknown, |cell| AgeBand::classify(cell));
            split.entry(band).or_default().push(row);
        }
        for (band, rows) in split {
            if let Some(writer) = writers.get_mut(&band) {
                writer.write_chunk(&Table::with_rows(headers.clone(), rows))?;
            }
        }
    }
    stats.record_input(PAIRS_TABLE, rows_in, Some(&pairs_path));

    let mut bands = BTreeMap::new();
    for (band, writer) in writers {
        let written = writer.finish()?;
        bands.insert(band.as_str(), written.rows);
        stats.record_output(band.as_str(), &written);
    }
    stats.insert_extra("bands", &bands);
    info!(
        rows = rows_in,
        adults = bands.get("adults").copied().unwrap_or(0),
        unknown = bands.get("unknown").copied().unwrap_or(0),
        duration_ms = start.elapsed().as_millis(),
        "split cohorts"
    );
    StageOutcome::finish(ctx, Stage::Cohorts, stats)
}
