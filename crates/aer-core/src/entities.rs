//! Entity tables extracted from raw shard directories.
//!
//! Each shard directory is read once through the worker pool and fans out
//! into one or more entity tables. Every table is keyed by the normalized
//! report key, renamed to its output vocabulary and reduced to one of three
//! shapes: latest value per key, first row per key, or distinct rows.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span};

use aer_ingest::{list_shard_files, read_shards};
use aer_model::{
    Coerced, ColumnContract, FieldsAvailable, REPORT_KEY_COLUMN, RejectedLedger, Table, coerce_id,
    normalize_report_key,
};
use aer_report::StageStats;

use crate::context::PipelineContext;
use crate::error::{CoreError, Result};
use crate::stage::{Stage, StageOutcome, write_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduce {
    /// Lexicographic maximum of every column per key.
    LatestPerKey,
    /// First row per key after a full row sort.
    FirstPerKey,
    Distinct,
}

#[derive(Debug)]
struct EntitySpec {
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    renames: &'static [(&'static str, &'static str)],
    reduce: Reduce,
    /// Output column coerced to an integer identifier.
    coerce: Option<&'static str>,
}

#[derive(Debug)]
struct SourceSpec {
    dir: &'static str,
    entities: &'static [EntitySpec],
}

const SOURCES: &[SourceSpec] = &[
    SourceSpec {
        dir: "report",
        entities: &[
            EntitySpec {
                name: "report",
                required: &[],
                optional: &["receiptdate", "receivedate", "transmissiondate"],
                renames: &[
                    ("receiptdate", "mostrecent_receive_date"),
                    ("receivedate", "receive_date"),
                    ("transmissiondate", "lastupdate_date"),
                ],
                reduce: Reduce::LatestPerKey,
                coerce: None,
            },
            EntitySpec {
                name: "report_serious",
                required: &[],
                optional: &[
                    "serious",
                    "seriousnesscongenitalanomali",
                    "seriousnesslifethreatening",
                    "seriousnessdisabling",
                    "seriousnessdeath",
                    "seriousnessother",
                ],
                renames: &[
                    ("seriousnesscongenitalanomali", "congenital_anomali"),
                    ("seriousnesslifethreatening", "life_threatening"),
                    ("seriousnessdisabling", "disabling"),
                    ("seriousnessdeath", "death"),
                    ("seriousnessother", "other"),
                ],
                reduce: Reduce::FirstPerKey,
                coerce: None,
            },
            EntitySpec {
                name: "reporter",
                required: &[],
                optional: &[
                    "companynumb",
                    "primarysource.qualification",
                    "primarysource.reportercountry",
                ],
                renames: &[
                    ("companynumb", "reporter_company"),
                    ("primarysource.qualification", "reporter_qualification"),
                    ("primarysource.reportercountry", "reporter_country"),
                ],
                reduce: Reduce::FirstPerKey,
                coerce: None,
            },
        ],
    },
    SourceSpec {
        dir: "patient",
        entities: &[EntitySpec {
            name: "patient",
            required: &[],
            optional: &[
                "patient.patientonsetage",
                "patient.patientonsetageunit",
                "master_age",
                "patient.patientsex",
                "patient.patientweight",
            ],
            renames: &[
                ("patient.patientonsetage", "patient_onsetage"),
                ("patient.patientonsetageunit", "patient_onsetageunit"),
                ("master_age", "patient_custom_master_age"),
                ("patient.patientsex", "patient_sex"),
                ("patient.patientweight", "patient_weight"),
            ],
            reduce: Reduce::FirstPerKey,
            coerce: None,
        }],
    },
    SourceSpec {
        dir: "patient_drug",
        entities: &[EntitySpec {
            name: "drugcharacteristics",
            required: &["medicinalproduct"],
            optional: &[
                "drugcharacterization",
                "drugadministrationroute",
                "drugindication",
                "cleaned_product",
            ],
            renames: &[
                ("medicinalproduct", "medicinal_product"),
                ("drugcharacterization", "drug_characterization"),
                ("drugadministrationroute", "drug_administration"),
                ("drugindication", "drug_indication"),
            ],
            reduce: Reduce::Distinct,
            coerce: None,
        }],
    },
    SourceSpec {
        dir: "patient_drug_openfda_rxcui",
        entities: &[EntitySpec {
            name: "drugs",
            required: &["value"],
            optional: &[],
            renames: &[("value", "rxcui")],
            reduce: Reduce::Distinct,
            coerce: Some("rxcui"),
        }],
    },
    SourceSpec {
        dir: "patient_reaction",
        entities: &[EntitySpec {
            name: "reactions",
            required: &["reactionmeddrapt"],
            optional: &["reactionoutcome"],
            renames: &[
                ("reactionmeddrapt", "reaction_meddrapt"),
                ("reactionoutcome", "reaction_outcome"),
            ],
            reduce: Reduce::Distinct,
            coerce: None,
        }],
    },
];

/// Names of every entity table, in extraction order.
pub fn entity_names() -> impl Iterator<Item = &'static str> {
    SOURCES
        .iter()
        .flat_map(|source| source.entities.iter().map(|entity| entity.name))
}

fn source_contract(source: &SourceSpec) -> ColumnContract {
    let mut required = vec![REPORT_KEY_COLUMN];
    let mut optional = Vec::new();
    for entity in source.entities {
        required.extend(entity.required.iter().copied());
        optional.extend(entity.optional.iter().copied());
    }
    ColumnContract::new(required).with_optional(optional)
}

/// Replaces raw keys by their normalized form and drops absent keys.
fn normalize_keys(table: &mut Table) -> Result<u64> {
    let key = table.require_column(REPORT_KEY_COLUMN)?;
    let before = table.len();
    table.rows.retain_mut(|row| match normalize_report_key(&row[key]) {
        Some(normalized) => {
            row[key] = normalized;
            true
        }
        None => false,
    });
    Ok((before - table.len()) as u64)
}

fn latest_per_key(table: &Table) -> Table {
    let mut latest: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for row in &table.rows {
        match latest.get_mut(row[0].as_str()) {
            Some(current) => {
                for (cell, value) in current.iter_mut().zip(row).skip(1) {
                    if !value.is_empty() && (cell.is_empty() || value.as_str() > cell.as_str()) {
                        cell.clone_from(value);
                    }
                }
            }
            None => {
                latest.insert(row[0].as_str(), row.clone());
            }
        }
    }
    Table::with_rows(table.headers.clone(), latest.into_values().collect())
}

/// Per-entity counters kept in the stage statistics.
#[derive(Debug, Default, Serialize)]
struct EntityCounts {
    rows_in: u64,
    rows_out: u64,
    duplicates_dropped: u64,
    empty_values_dropped: u64,
}

fn build_entity(
    ctx: &PipelineContext,
    spec: &EntitySpec,
    source: &Table,
    source_fields: &FieldsAvailable,
    rejected: &mut RejectedLedger,
) -> Result<(Table, FieldsAvailable, EntityCounts)> {
    let mut columns = vec![REPORT_KEY_COLUMN];
    let mut missing = Vec::new();
    for column in spec.required.iter().chain(spec.optional) {
        if source_fields.has(column) {
            columns.push(*column);
        } else {
            missing.push((*column).to_string());
        }
    }
    let fields = FieldsAvailable::new(columns.iter().map(|c| (*c).to_string()), missing);

    let mut table = source.project(&columns);
    for (from, to) in spec.renames {
        table.rename(from, to);
    }
    let mut counts = EntityCounts {
        rows_in: table.len() as u64,
        ..EntityCounts::default()
    };

    if let Some(column) = spec.coerce {
        let idx = table.require_column(column)?;
        let scope = format!("{}.{column}", spec.name);
        let engine = &ctx.options.engine;
        let mut kept = Vec::with_capacity(table.len());
        for mut row in std::mem::take(&mut table.rows) {
            match coerce_id(&row[idx]) {
                Coerced::Value(value) => {
                    row[idx] = value.to_string();
                    kept.push(row);
                }
                Coerced::Empty => counts.empty_values_dropped += 1,
                Coerced::Rejected => {
                    rejected.reject(&scope, &row[idx], engine.coercion, engine.rejected_sample_size)?;
                }
            }
        }
        table.rows = kept;
    }

    let before = table.len();
    match spec.reduce {
        Reduce::LatestPerKey => table = latest_per_key(&table),
        Reduce::FirstPerKey => {
            table.sort_rows_by(&[REPORT_KEY_COLUMN]);
            table.dedup_by(&[REPORT_KEY_COLUMN])?;
        }
        Reduce::Distinct => {
            table.dedup_rows();
        }
    }
    counts.duplicates_dropped = (before - table.len()) as u64;
    counts.rows_out = table.len() as u64;
    Ok((table, fields, counts))
}

/// Extracts every entity table into `<out>/er_tables/`.
pub fn extract_entities(ctx: &PipelineContext) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = "entities").entered();
    let start = Instant::now();
    let mut stats = StageStats::new(Stage::Entities.as_str());
    let mut rejected = RejectedLedger::default();
    let read_options = ctx.read_options();
    let mut null_keys: BTreeMap<&str, u64> = BTreeMap::new();
    let mut counts: BTreeMap<&str, EntityCounts> = BTreeMap::new();

    for source in SOURCES {
        let dir = ctx.source_dir(source.dir);
        let files = list_shard_files(&dir)?;
        if files.is_empty() {
            return Err(CoreError::EmptySource { path: dir });
        }
        let contract = source_contract(source);
        let mut shards = read_shards(&files, &contract, &read_options, ctx.options.engine.workers)?;
        stats.record_input(source.dir, shards.table.len() as u64, Some(&dir));
        null_keys.insert(source.dir, normalize_keys(&mut shards.table)?);

        for entity in source.entities {
            let (table, fields, entity_counts) =
                build_entity(ctx, entity, &shards.table, &shards.fields, &mut rejected)?;
            let written = write_output(
                &mut stats,
                entity.name,
                &ctx.er_table(entity.name),
                &table,
                &[REPORT_KEY_COLUMN],
            )?;
            stats.record_fields(entity.name, &fields);
            info!(
                table = entity.name,
                rows = written.rows,
                missing_optional = fields.missing_optional().count(),
                "wrote entity table"
            );
            counts.insert(entity.name, entity_counts);
        }
    }

    stats.merge_rejected(&rejected, ctx.options.engine.rejected_sample_size);
    stats.insert_extra("null_keys", &null_keys);
    stats.insert_extra("entities", &counts);
    info!(duration_ms = start.elapsed().as_millis(), "extracted entity tables");
    StageOutcome::finish(ctx, Stage::Entities, stats)
}
