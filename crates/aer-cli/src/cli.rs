//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

use aer_model::{CoercionPolicy, JoinType};

use crate::logging::{LogConfig, LogFormat};

#[derive(Parser)]
#[command(
    name = "aer",
    version,
    about = "Adverse-event report pipeline - resolve drugs and reactions into pairs",
    long_about = "Extract entity tables from adverse-event report shards, standardize\n\
                  drug and reaction mentions against an RxNorm/MedDRA vocabulary and\n\
                  materialize drug ingredient x reaction pairs per report."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging setup implied by the flags.
    ///
    /// `--log-level` wins over `-v`/`-q`; either one disables `RUST_LOG`.
    /// Module paths are shown at debug and below and in JSON output, where
    /// events from the resolvers and the join engine need telling apart.
    pub fn log_config(&self, stderr_is_terminal: bool) -> LogConfig {
        let level_filter = self
            .log_level
            .map_or_else(|| self.verbosity.tracing_level_filter(), LevelFilter::from);
        let format = LogFormat::from(self.log_format);
        let with_ansi = match self.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.log_file.is_none() && stderr_is_terminal,
        };
        LogConfig {
            level_filter,
            use_env_filter: !(self.verbosity.is_present() || self.log_level.is_some()),
            with_target: format == LogFormat::Json || level_filter >= LevelFilter::DEBUG,
            with_ansi,
            ..LogConfig::default()
        }
        .with_format(format)
        .with_log_file(self.log_file.clone())
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract entity tables from the raw shard directories.
    Entities,

    /// Map drugs and reactions onto the vocabulary.
    Standardize,

    /// Merge patient, report, seriousness and reporter tables.
    Baseline,

    /// Materialize drug ingredient x reaction pairs.
    Pairs,

    /// Write unmatched-product, unmapped-reaction and duplicate-pair reports.
    Qa,

    /// Split the pair table into age cohorts.
    Cohorts,

    /// Run every stage in order.
    Run,

    /// Print ingredient and hierarchy resolutions of concept ids.
    Resolve(ResolveArgs),
}

/// Input, output and tuning flags shared by every subcommand.
///
/// Flags override values loaded from `--config`.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// TOML file with pipeline options.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the raw shard directories.
    #[arg(long = "data-dir", value_name = "DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Directory holding CONCEPT and CONCEPT_RELATIONSHIP.
    #[arg(long = "vocab-dir", value_name = "DIR", global = true)]
    pub vocab_dir: Option<PathBuf>,

    /// Output root.
    #[arg(long = "out-dir", value_name = "DIR", default_value = "out", global = true)]
    pub out_dir: PathBuf,

    /// Rows per streamed chunk.
    #[arg(long = "chunk-size", value_name = "ROWS", global = true)]
    pub chunk_size: Option<usize>,

    /// Worker threads for shard ingestion.
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Keys per join index lookup.
    #[arg(long = "index-batch-size", value_name = "KEYS", global = true)]
    pub index_batch_size: Option<usize>,

    /// Join inputs above this many rows spill to the on-disk index.
    #[arg(long = "in-memory-threshold", value_name = "ROWS", global = true)]
    pub in_memory_threshold: Option<usize>,

    /// Join type for the baseline merge and the final pair join.
    #[arg(long = "join-type", value_enum, global = true)]
    pub join_type: Option<JoinTypeArg>,

    /// What to do with identifiers that are not integers.
    #[arg(long, value_enum, global = true)]
    pub coercion: Option<CoercionArg>,

    /// Maximum hops from a drug concept to its ingredients.
    #[arg(long = "ingredient-depth", value_name = "HOPS", global = true)]
    pub ingredient_max_depth: Option<usize>,

    /// Maximum hops from a term to its top-level category.
    #[arg(long = "hierarchy-depth", value_name = "HOPS", global = true)]
    pub hierarchy_max_depth: Option<usize>,

    /// Skip the gzip integrity pre-check.
    #[arg(long = "no-verify", global = true)]
    pub no_verify: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Concept ids to resolve.
    #[arg(value_name = "CONCEPT_ID", required = true)]
    pub concept_ids: Vec<i64>,

    /// Print JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum JoinTypeArg {
    Inner,
    Left,
    Outer,
}

impl From<JoinTypeArg> for JoinType {
    fn from(value: JoinTypeArg) -> Self {
        match value {
            JoinTypeArg::Inner => JoinType::Inner,
            JoinTypeArg::Left => JoinType::Left,
            JoinTypeArg::Outer => JoinType::Outer,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CoercionArg {
    Fail,
    DropAndCount,
}

impl From<CoercionArg> for CoercionPolicy {
    fn from(value: CoercionArg) -> Self {
        match value {
            CoercionArg::Fail => CoercionPolicy::Fail,
            CoercionArg::DropAndCount => CoercionPolicy::DropAndCount,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        }
    }
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_defer_to_rust_log() {
        let config = parse(&["aer", "run"]).log_config(true);
        assert_eq!(config.level_filter, LevelFilter::INFO);
        assert!(config.use_env_filter);
        assert!(!config.with_target);
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn explicit_level_beats_verbosity_and_shows_targets() {
        let config = parse(&["aer", "-q", "run", "--log-level", "trace"]).log_config(true);
        assert_eq!(config.level_filter, LevelFilter::TRACE);
        assert!(!config.use_env_filter);
        assert!(config.with_target);
    }

    #[test]
    fn log_file_turns_off_auto_color() {
        let config = parse(&["aer", "qa", "--log-file", "aer.log", "--log-format", "json"])
            .log_config(true);
        assert!(!config.with_ansi);
        assert!(config.with_target);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_file, Some(PathBuf::from("aer.log")));

        let forced =
            parse(&["aer", "--color", "always", "qa", "--log-file", "aer.log"]).log_config(false);
        assert!(forced.with_ansi);
    }
}
