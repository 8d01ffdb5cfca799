use std::io::Write;

use aer_model::{CoercionPolicy, JoinType, ModelError, PipelineOptions};
use tempfile::NamedTempFile;

#[test]
fn loads_options_from_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "[resolver]\ningredient_max_depth = 3\n\n[engine]\nworkers = 2\njoin_type = \"left\"\ncoercion = \"drop-and-count\""
    )
    .expect("write");

    let options = PipelineOptions::load(file.path()).expect("load");
    assert_eq!(options.resolver.ingredient_max_depth, 3);
    assert_eq!(options.resolver.hierarchy_max_depth, 4);
    assert_eq!(options.engine.workers, 2);
    assert_eq!(options.engine.join_type, JoinType::Left);
    assert_eq!(options.engine.coercion, CoercionPolicy::DropAndCount);
    assert!(options.vocab_dir.is_none());
}

#[test]
fn missing_file_names_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.toml");
    let err = PipelineOptions::load(&path).expect_err("missing");
    assert!(matches!(err, ModelError::ConfigRead { .. }));
    assert!(err.to_string().contains("absent.toml"));
}
