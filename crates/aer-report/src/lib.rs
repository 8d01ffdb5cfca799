//! Deterministic table output and per-stage statistics.

pub mod error;
pub mod stats;
pub mod writer;

pub use error::{ReportError, Result};
pub use stats::{InputStats, KeyCounter, OutputStats, PairEstimates, StageStats};
pub use writer::{TableWriter, WrittenTable, write_table};
