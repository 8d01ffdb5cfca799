use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use aer_core::{
    AgeBand, CoreError, PAIRS_TABLE, PipelineContext, Stage, run_all, run_stage,
};
use aer_ingest::{IngestError, ReadOptions, ShardReader};
use aer_model::{ColumnContract, Table};

const CONCEPTS: &str = "\
concept_id\tconcept_name\tdomain_id\tvocabulary_id\tconcept_class_id\tstandard_concept\tconcept_code
1\tAspirin 81mg\tDrug\tRxNorm\tClinical Drug\tS\t243670
2\tAspirin\tDrug\tRxNorm\tIngredient\tS\t1191
5\tacetylsalicylic acid\tDrug\tATC\tATC 5th\tC\tN02BA01
10\tHeadache\tCondition\tMedDRA\tPT\tC\t10019211
11\tHeadaches NEC\tCondition\tMedDRA\tHLT\tC\t10019233
12\tHeadaches\tCondition\tMedDRA\tHLGT\tC\t10019231
13\tNervous system disorders\tCondition\tMedDRA\tSOC\tC\t10029205
";

const RELATIONSHIPS: &str = "\
concept_id_1,concept_id_2,relationship_id
1,2,RxNorm has ing
2,5,RxNorm - ATC
10,11,Is a
11,12,Is a
12,13,Is a
";

const REPORT: &str = "\
safetyreportid,receivedate,receiptdate,transmissiondate,serious,seriousnessdeath,companynumb,primarysource.qualification,primarysource.reportercountry
1001.0,20200101,20200105,20200110,1,,ACME-1,1,US
1001,20200101,20200107,20200110,1,,ACME-1,1,US
1002,20200201,20200201,20200202,2,,,3,CA
1003,20200301,20200301,20200302,1,1,,5,FR
";

const PATIENT: &str = "\
safetyreportid,patient.patientonsetage,patient.patientonsetageunit,master_age,patient.patientsex
1001,45,801,45,2
1002,6,802,0.5,1
1003,,,,
";

const DRUGS: &str = "\
safetyreportid,medicinalproduct,drugcharacterization
1001,ASPIRIN 81MG,1
1001,ASPIRIN 81MG,1
1001,UNKNOWN PILL,2
1002,Aspirin,1
";

const RXCUI: &str = "\
safetyreportid,value
1001,243670
1001,not-a-code
1002,
";

const REACTIONS: &str = "\
safetyreportid,reactionmeddrapt,reactionoutcome
1001,Headache,1
1001,Made up term,6
1003,HEADACHE,1
";

fn write_gz(path: &Path, contents: &str) {
    let file = std::fs::File::create(path).expect("create");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).expect("write");
    encoder.finish().expect("finish");
}

fn write_shard(root: &Path, dir: &str, contents: &str) {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).expect("shard dir");
    write_gz(&dir.join("0001.csv.gz"), contents);
}

struct Fixture {
    _root: TempDir,
    ctx: PipelineContext,
}

fn fixture() -> Fixture {
    let root = TempDir::new().expect("temp dir");
    let data = root.path().join("data");
    write_shard(&data, "report", REPORT);
    write_shard(&data, "patient", PATIENT);
    write_shard(&data, "patient_drug", DRUGS);
    write_shard(&data, "patient_drug_openfda_rxcui", RXCUI);
    write_shard(&data, "patient_reaction", REACTIONS);

    let vocab = root.path().join("vocab");
    std::fs::create_dir_all(&vocab).expect("vocab dir");
    std::fs::write(vocab.join("CONCEPT.csv"), CONCEPTS).expect("concepts");
    write_gz(&vocab.join("CONCEPT_RELATIONSHIP.csv.gz"), RELATIONSHIPS);

    let ctx = PipelineContext::new(&data, root.path().join("out")).with_vocab_dir(&vocab);
    Fixture { _root: root, ctx }
}

fn read(path: &Path) -> Table {
    ShardReader::open_file(path, ColumnContract::any(), ReadOptions::default())
        .expect("open output")
        .read_all()
        .expect("read output")
}

#[test]
fn full_run_produces_one_aspirin_headache_pair() {
    let fx = fixture();
    let outcomes = run_all(&fx.ctx).expect("pipeline");
    assert_eq!(
        outcomes.iter().map(|o| o.stage).collect::<Vec<_>>(),
        Stage::ALL.to_vec()
    );

    let pairs = read(&fx.ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz")));
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs.cell(0, "safetyreportid"), Some("1001"));
    assert_eq!(pairs.cell(0, "ingredient_concept_id"), Some("2"));
    assert_eq!(pairs.cell(0, "soc_concept_id"), Some("13"));
    assert_eq!(pairs.cell(0, "atc_codes"), Some("N02BA01"));
    assert_eq!(pairs.cell(0, "patient_custom_master_age"), Some("45"));
    assert_eq!(pairs.cell(0, "report_mostrecent_receive_date"), Some("20200107"));

    let pair_stats = &outcomes[3].stats;
    let estimates = pair_stats.pair_estimates.expect("estimates");
    assert_eq!(estimates.pairs_pre_resolution, 4);
    assert_eq!(estimates.pairs_after_reaction, 1);
    assert_eq!(pair_stats.unique_counts.get("reports"), Some(&1));
    assert!(fx.ctx.stats_dir().join("pairs.json").is_file());
}

#[test]
fn drug_only_report_yields_no_pairs_but_stays_in_baseline() {
    let fx = fixture();
    let outcomes = run_all(&fx.ctx).expect("pipeline");

    let drugs = read(&fx.ctx.standard_table("drug_mentions_resolved"));
    let keys: Vec<&str> = drugs.column_values("safetyreportid").expect("key").collect();
    assert_eq!(keys, vec!["1001", "1002"]);

    let baseline = &outcomes[2];
    assert_eq!(baseline.output_rows("patients_report_serious_reporter"), Some(3));
    let pairs = read(&fx.ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz")));
    assert!(pairs.column_values("safetyreportid").expect("key").all(|key| key != "1002"));
}

#[test]
fn entity_stage_counts_rejected_identifiers() {
    let fx = fixture();
    let outcome = run_stage(&fx.ctx, Stage::Entities).expect("entities");
    let rejected = outcome.stats.rejected.get("drugs.rxcui").expect("rejected scope");
    assert_eq!(rejected.count, 1);
    assert_eq!(rejected.sample, vec!["not-a-code"]);
    assert_eq!(outcome.output_rows("drugs"), Some(1));
    assert_eq!(outcome.output_rows("report"), Some(3));
    assert_eq!(outcome.output_rows("drugcharacteristics"), Some(3));
}

#[test]
fn qa_and_cohorts_report_what_fell_through() {
    let fx = fixture();
    let outcomes = run_all(&fx.ctx).expect("pipeline");

    let unmatched = read(&fx.ctx.qa_dir().join("unmatched_products.csv.gz"));
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched.cell(0, "term"), Some("UNKNOWN PILL"));
    let unmapped = read(&fx.ctx.qa_dir().join("unmapped_reactions.csv.gz"));
    assert_eq!(unmapped.cell(0, "term"), Some("Made up term"));
    assert_eq!(unmapped.cell(0, "count_in_reports"), Some("1"));
    let duplicates = read(&fx.ctx.qa_dir().join("duplicate_pairs.csv.gz"));
    assert!(duplicates.is_empty());

    let cohorts = &outcomes[5];
    assert_eq!(cohorts.output_rows(AgeBand::Adults.as_str()), Some(1));
    assert_eq!(cohorts.output_rows(AgeBand::Infancy.as_str()), Some(0));
    for band in AgeBand::ALL {
        assert!(fx.ctx.cohorts_dir().join(format!("{band}.csv.gz")).is_file());
    }
}

#[test]
fn reruns_are_byte_identical() {
    let fx = fixture();
    run_all(&fx.ctx).expect("first run");
    let path = fx.ctx.processed_dir().join(format!("{PAIRS_TABLE}.csv.gz"));
    let first = std::fs::read(&path).expect("first");
    run_all(&fx.ctx).expect("second run");
    assert_eq!(std::fs::read(&path).expect("second"), first);
}

#[test]
fn stages_name_their_missing_inputs() {
    let fx = fixture();
    let err = run_stage(&fx.ctx, Stage::Pairs).unwrap_err();
    assert!(matches!(err, CoreError::MissingInput { stage: "pairs", .. }));

    let err = run_stage(&fx.ctx, Stage::Cohorts).unwrap_err();
    assert!(matches!(err, CoreError::MissingInput { stage: "cohorts", .. }));
}

#[test]
fn missing_source_directory_or_column_is_fatal() {
    let fx = fixture();
    std::fs::remove_dir_all(fx.ctx.source_dir("patient_reaction")).expect("remove");
    let err = run_stage(&fx.ctx, Stage::Entities).unwrap_err();
    assert!(matches!(err, CoreError::Ingest(IngestError::DirectoryNotFound { .. })));

    let fx = fixture();
    write_shard(&fx.ctx.data_dir, "patient_drug", "safetyreportid,drugcharacterization\n1001,1\n");
    let err = run_stage(&fx.ctx, Stage::Entities).unwrap_err();
    assert!(matches!(err, CoreError::Ingest(IngestError::MissingColumn { .. })));
}

#[test]
fn vocabulary_is_required_for_standardization() {
    let fx = fixture();
    run_stage(&fx.ctx, Stage::Entities).expect("entities");
    let ctx = PipelineContext::new(&fx.ctx.data_dir, &fx.ctx.out_dir);
    let err = run_stage(&ctx, Stage::Standardize).unwrap_err();
    assert!(matches!(err, CoreError::MissingVocabDir));
}
