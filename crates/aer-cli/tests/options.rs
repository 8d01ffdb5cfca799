//! Flag parsing and config precedence.

use std::path::PathBuf;

use clap::Parser;
use tempfile::TempDir;

use aer_cli::cli::{Cli, Command};
use aer_cli::options::{build_context, resolve_options};
use aer_model::{CoercionPolicy, JoinType};

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from([
        "aer",
        "pairs",
        "--out-dir",
        "/tmp/aer-out",
        "--join-type",
        "left",
        "--chunk-size",
        "500",
    ])
    .unwrap();
    assert!(matches!(cli.command, Command::Pairs));
    assert_eq!(cli.pipeline.out_dir, PathBuf::from("/tmp/aer-out"));
    assert_eq!(cli.pipeline.data_dir, PathBuf::from("data"));

    let options = resolve_options(&cli.pipeline).unwrap();
    assert_eq!(options.engine.join_type, JoinType::Left);
    assert_eq!(options.engine.chunk_size, 500);
    assert_eq!(options.engine.workers, 4);
}

#[test]
fn flags_override_the_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("aer.toml");
    std::fs::write(
        &config,
        "vocab_dir = \"/vocab\"\n\n[engine]\nworkers = 2\nchunk_size = 1000\ncoercion = \"fail\"\n",
    )
    .unwrap();
    let cli = Cli::try_parse_from([
        "aer",
        "--config",
        config.to_str().unwrap(),
        "--workers",
        "8",
        "--no-verify",
        "run",
    ])
    .unwrap();

    let options = resolve_options(&cli.pipeline).unwrap();
    assert_eq!(options.engine.workers, 8);
    assert_eq!(options.engine.chunk_size, 1000);
    assert_eq!(options.engine.coercion, CoercionPolicy::Fail);
    assert!(!options.engine.verify_integrity);
    assert_eq!(options.vocab_dir, Some(PathBuf::from("/vocab")));
}

#[test]
fn invalid_values_are_rejected() {
    let cli = Cli::try_parse_from(["aer", "run", "--chunk-size", "0"]).unwrap();
    assert!(build_context(&cli.pipeline).is_err());

    assert!(Cli::try_parse_from(["aer", "run", "--join-type", "cross"]).is_err());
    assert!(Cli::try_parse_from(["aer", "resolve"]).is_err());
}

#[test]
fn resolve_takes_concept_ids() {
    let cli = Cli::try_parse_from(["aer", "resolve", "1", "10", "--json"]).unwrap();
    match cli.command {
        Command::Resolve(args) => {
            assert_eq!(args.concept_ids, vec![1, 10]);
            assert!(args.json);
        }
        _ => panic!("expected resolve"),
    }
}
