//! Quality reports: unmapped mention frequencies and duplicated pairs.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::{info, info_span, warn};

use aer_model::{ColumnContract, REPORT_KEY_COLUMN, Table};
use aer_report::{StageStats, TableWriter, WrittenTable};
use aer_vocab::VocabularyStore;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::pairs::PAIRS_TABLE;
use crate::stage::{Stage, StageOutcome, write_output};
use crate::standardize::{Standardizer, distinct_mentions};

const STAGE: &str = "qa";

const FREQUENCY_COLUMNS: [&str; 2] = ["term", "count_in_reports"];

/// Columns identifying one pair occurrence.
const PAIR_IDENTITY: [&str; 4] = [
    REPORT_KEY_COLUMN,
    "medicinal_product",
    "ingredient_concept_id",
    "reaction_meddrapt",
];

/// Frequency table sorted by count descending, then term.
fn frequency_table(counts: BTreeMap<String, u64>) -> Table {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let rows = entries
        .into_iter()
        .map(|(term, count)| vec![term, count.to_string()])
        .collect();
    Table::with_rows(
        FREQUENCY_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        rows,
    )
}

fn write_ranked(stats: &mut StageStats, name: &str, path: &Path, table: &Table) -> Result<WrittenTable> {
    let mut writer = TableWriter::create(path, table.headers.iter().cloned(), &["term"])?
        .keep_row_order();
    writer.write_chunk(table)?;
    let written = writer.finish()?;
    stats.record_output(name, &written);
    Ok(written)
}

/// Counts every (report key, product, ingredient, reaction) of the pair table
/// and keeps those seen more than once.
fn duplicate_pairs(ctx: &PipelineContext, path: &Path) -> Result<(u64, Table)> {
    let mut reader = ctx.open_output_with(STAGE, path, ColumnContract::new(PAIR_IDENTITY))?;
    let mut seen: BTreeMap<Vec<String>, u64> = BTreeMap::new();
    let mut rows = 0u64;
    while let Some(chunk) = reader.next_chunk()? {
        rows += chunk.len() as u64;
        for row in chunk.rows {
            *seen.entry(row).or_default() += 1;
        }
    }
    let mut headers: Vec<String> = PAIR_IDENTITY.iter().map(|c| (*c).to_string()).collect();
    headers.push("occurrences".to_string());
    let duplicates = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(mut row, count)| {
            row.push(count.to_string());
            row
        })
        .collect();
    Ok((rows, Table::with_rows(headers, duplicates)))
}

/// Loads the vocabulary and writes the QA reports.
pub fn quality_reports(ctx: &PipelineContext) -> Result<StageOutcome> {
    let store = ctx.load_vocabulary()?;
    quality_reports_with(ctx, &store)
}

pub fn quality_reports_with(ctx: &PipelineContext, store: &VocabularyStore) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = STAGE).entered();
    let start = Instant::now();
    let mut stats = StageStats::new(Stage::Qa.as_str());
    let standardizer = Standardizer::new(store, &ctx.options.resolver)?;
    let qa_dir = ctx.qa_dir();

    let characteristics_path = ctx.er_table("drugcharacteristics");
    let characteristics = ctx.read_output(
        STAGE,
        &characteristics_path,
        ColumnContract::new([REPORT_KEY_COLUMN, "medicinal_product"])
            .with_optional(["cleaned_product"]),
    )?;
    stats.record_input(
        "drugcharacteristics",
        characteristics.len() as u64,
        Some(&characteristics_path),
    );
    let mut unmatched: BTreeMap<String, u64> = BTreeMap::new();
    for ((_, product), cleaned) in
        distinct_mentions(&characteristics, "medicinal_product", Some("cleaned_product"))?
    {
        let text = cleaned.as_deref().unwrap_or(&product);
        if standardizer.rxnorm_by_name(text).is_none() {
            *unmatched.entry(product).or_default() += 1;
        }
    }
    let unmatched_terms = unmatched.len();
    write_ranked(
        &mut stats,
        "unmatched_products",
        &qa_dir.join("unmatched_products.csv.gz"),
        &frequency_table(unmatched),
    )?;

    let reactions_path = ctx.er_table("reactions");
    let reactions = ctx.read_output(
        STAGE,
        &reactions_path,
        ColumnContract::new([REPORT_KEY_COLUMN, "reaction_meddrapt"]),
    )?;
    stats.record_input("reactions", reactions.len() as u64, Some(&reactions_path));
    let mut unmapped: BTreeMap<String, u64> = BTreeMap::new();
    for (_, reaction) in distinct_mentions(&reactions, "reaction_meddrapt", None)?.into_keys() {
        if standardizer.preferred_term(&reaction).is_none() {
            *unmapped.entry(reaction).or_default() += 1;
        }
    }
    let unmapped_terms = unmapped.len();
    write_ranked(
        &mut stats,
        "unmapped_reactions",
        &qa_dir.join("unmapped_reactions.csv.gz"),
        &frequency_table(unmapped),
    )?;

    let pairs_path = ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz"));
    if pairs_path.is_file() {
        let (pair_rows, duplicates) = duplicate_pairs(ctx, &pairs_path)?;
        stats.record_input(PAIRS_TABLE, pair_rows, Some(&pairs_path));
        let written = write_output(
            &mut stats,
            "duplicate_pairs",
            &qa_dir.join("duplicate_pairs.csv.gz"),
            &duplicates,
            &PAIR_IDENTITY,
        )?;
        if written.rows > 0 {
            warn!(rows = written.rows, "pair table holds duplicated pairs");
        }
        stats.insert_extra("duplicate_pairs", written.rows);
    } else {
        info!(path = %pairs_path.display(), "no pair table yet; skipping duplicate check");
    }

    stats.insert_extra("unmatched_product_terms", unmatched_terms);
    stats.insert_extra("unmapped_reaction_terms", unmapped_terms);
    info!(
        unmatched_products = unmatched_terms,
        unmapped_reactions = unmapped_terms,
        duration_ms = start.elapsed().as_millis(),
        "wrote QA reports"
    );
    StageOutcome::finish(ctx, Stage::Qa, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_rank_by_count_then_term() {
        let counts = BTreeMap::from([
            ("ZETA".to_string(), 2),
            ("ALPHA".to_string(), 1),
            ("BETA".to_string(), 2),
        ]);
        let table = frequency_table(counts);
        assert_eq!(table.headers, vec!["term", "count_in_reports"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["BETA", "2"],
                vec!["ZETA", "2"],
                vec!["ALPHA", "1"],
            ]
        );
    }
}
