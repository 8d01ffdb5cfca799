use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use aer_ingest::{ChunkedReader, IngestError, ReadOptions, ShardReader, read_shards};
use aer_model::ColumnContract;

fn write_gz(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).expect("write");
    encoder.finish().expect("finish");
    path
}

fn report_contract() -> ColumnContract {
    ColumnContract::new(["safetyreportid"]).with_optional(["receivedate", "receiptdate"])
}

#[test]
fn reads_fixed_size_chunks() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_gz(
        dir.path(),
        "0001.csv.gzip",
        "safetyreportid,receivedate,extra\n1,20200101,x\n2,20200102,y\n3,20200103,z\n",
    );
    let options = ReadOptions::default().with_chunk_size(2);
    let mut reader = ChunkedReader::open(&path, &report_contract(), &options).expect("open");
    assert_eq!(reader.headers(), ["safetyreportid", "receivedate"]);
    assert!(reader.fields().has("receivedate"));
    assert_eq!(
        reader.fields().missing_optional().collect::<Vec<_>>(),
        vec!["receiptdate"]
    );

    let first = reader.next_chunk().expect("chunk").expect("rows");
    assert_eq!(first.len(), 2);
    let second = reader.next_chunk().expect("chunk").expect("rows");
    assert_eq!(second.rows, vec![vec!["3", "20200103"]]);
    assert!(reader.next_chunk().expect("chunk").is_none());
    assert_eq!(reader.rows_read(), 3);
}

#[test]
fn detects_tab_delimiter_in_plain_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("CONCEPT.csv");
    std::fs::write(
        &path,
        "concept_id\tconcept_name\tconcept_class_id\n1\tAspirin 81mg\tClinical Drug\n",
    )
    .expect("write");
    let table = ChunkedReader::open(&path, &ColumnContract::any(), &ReadOptions::default())
        .expect("open")
        .read_all()
        .expect("read");
    assert_eq!(table.cell(0, "concept_name"), Some("Aspirin 81mg"));
    assert_eq!(table.cell(0, "concept_class_id"), Some("Clinical Drug"));
}

#[test]
fn missing_required_column_names_file_and_column() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_gz(dir.path(), "0001.csv.gz", "receivedate\n20200101\n");
    let err = ChunkedReader::open(&path, &report_contract(), &ReadOptions::default())
        .err()
        .expect("missing column");
    match err {
        IngestError::MissingColumn { column, path: err_path } => {
            assert_eq!(column, "safetyreportid");
            assert_eq!(err_path, path);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn shard_reader_unifies_headers_across_files() {
    let dir = TempDir::new().expect("temp dir");
    write_gz(dir.path(), "0001.csv.gzip", "safetyreportid\n1\n2\n");
    write_gz(
        dir.path(),
        "0002.csv.gzip",
        "receiptdate,safetyreportid\n20210101,3\n",
    );
    let options = ReadOptions::default().with_chunk_size(10);
    let mut reader = ShardReader::open_dir(dir.path(), report_contract(), options).expect("open");
    assert_eq!(reader.headers(), ["safetyreportid", "receiptdate"]);
    assert!(reader.fields().has("receiptdate"));
    assert!(!reader.fields().has("receivedate"));

    let first = reader.next_chunk().expect("chunk").expect("rows");
    assert_eq!(first.rows, vec![vec!["1", ""], vec!["2", ""]]);
    let second = reader.next_chunk().expect("chunk").expect("rows");
    assert_eq!(second.rows, vec![vec!["3", "20210101"]]);
    assert!(reader.next_chunk().expect("chunk").is_none());
}

#[test]
fn shard_reader_fails_on_corrupt_shard_before_reading() {
    let dir = TempDir::new().expect("temp dir");
    write_gz(dir.path(), "0001.csv.gz", "safetyreportid\n1\n");
    std::fs::write(dir.path().join("0002.csv.gz"), b"\x1f\x8b\x08\x00garbage").expect("write");
    let err = ShardReader::open_dir(dir.path(), report_contract(), ReadOptions::default())
        .err()
        .expect("corrupt");
    assert!(matches!(err, IngestError::CorruptArchive { .. }));
}

#[test]
fn worker_pool_reads_every_shard() {
    let dir = TempDir::new().expect("temp dir");
    let mut files = Vec::new();
    for idx in 0..7 {
        let contents = format!("safetyreportid,receivedate\n{idx}a,2020010{idx}\n{idx}b,\n");
        files.push(write_gz(dir.path(), &format!("{idx:04}.csv.gzip"), &contents));
    }
    let set = read_shards(&files, &report_contract(), &ReadOptions::default(), 3).expect("read");
    assert_eq!(set.files, 7);
    assert_eq!(set.table.len(), 14);
    let mut table = set.table;
    table.sort_rows_by(&["safetyreportid"]);
    assert_eq!(table.cell(0, "safetyreportid"), Some("0a"));
    assert_eq!(table.cell(13, "safetyreportid"), Some("6b"));
}

#[test]
fn worker_pool_propagates_errors() {
    let dir = TempDir::new().expect("temp dir");
    let good = write_gz(dir.path(), "0001.csv.gz", "safetyreportid\n1\n");
    let bad = write_gz(dir.path(), "0002.csv.gz", "other\n1\n");
    let err = read_shards(&[good, bad], &report_contract(), &ReadOptions::default(), 2)
        .expect_err("missing column");
    assert!(matches!(err, IngestError::MissingColumn { .. }));
}
