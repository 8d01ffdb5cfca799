//! Chunked ingestion of compressed tabular shard files.
//!
//! Readers stream fixed-size row chunks under a required/optional column
//! contract. Directories of many small shards are read by a bounded worker
//! pool; a sequential [`ShardReader`] exposes a directory as one chunk stream.

pub mod chunked;
pub mod discovery;
pub mod error;
pub mod integrity;
pub mod pool;
pub mod shards;

pub use chunked::{ChunkedReader, ReadOptions};
pub use discovery::{find_table_file, is_compressed, is_tabular_file, list_shard_files};
pub use error::{IngestError, Result};
pub use integrity::{verify_all, verify_gzip};
pub use pool::{ShardSet, read_shards};
pub use shards::ShardReader;
