//! Bounded-memory joins of report-keyed tables.
//!
//! [`StreamingJoin`] drives one input in chunks and looks up the rows of the
//! others per chunk, through memory or a disposable SQLite [`KeyIndex`]. Its
//! output equals the whole-table [`hash_join`] for every key.

pub mod engine;
pub mod error;
pub mod fold;
pub mod index;
mod layout;
pub mod memory;
pub mod source;

pub use engine::{
    CollectSink, JoinInput, JoinReport, JoinSpec, RowSink, StreamingJoin, choose_driver,
};
pub use error::{JoinError, Result};
pub use index::{KeyIndex, MAX_BATCH_SIZE, Row};
pub use layout::prefixed;
pub use memory::{MemoryInput, hash_join};
pub use source::{ChunkSource, TableChunks};
