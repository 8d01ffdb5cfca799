//! Integrity pre-check for compressed inputs.
//!
//! A gzip member is only verified once its trailer (CRC-32 and length) has
//! been read, so the check decompresses each file fully into a sink before
//! any parsing starts.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::discovery::is_compressed;
use crate::error::{IngestError, Result};

/// Decompresses `path` fully and returns the decompressed byte count.
pub fn verify_gzip(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(1 << 20, file));
    let bytes = io::copy(&mut decoder, &mut io::sink()).map_err(|source| {
        IngestError::CorruptArchive {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!(path = %path.display(), bytes, "verified compressed input");
    Ok(bytes)
}

/// Verifies every compressed file in `paths`; plain files are skipped.
pub fn verify_all(paths: &[PathBuf]) -> Result<()> {
    for path in paths.iter().filter(|path| is_compressed(path)) {
        verify_gzip(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("write");
        encoder.finish().expect("finish")
    }

    #[test]
    fn accepts_valid_archive() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("0001.csv.gz");
        std::fs::write(&path, gzip(b"safetyreportid\n1\n")).expect("write");
        assert_eq!(verify_gzip(&path).expect("verify"), 17);
    }

    #[test]
    fn rejects_corrupted_trailer() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("0001.csv.gz");
        let mut bytes = gzip(b"safetyreportid\n1\n2\n3\n");
        let len = bytes.len();
        // Flip a CRC byte in the trailer.
        bytes[len - 8] ^= 0xff;
        std::fs::write(&path, bytes).expect("write");
        let err = verify_gzip(&path).expect_err("corrupt");
        assert!(matches!(err, IngestError::CorruptArchive { .. }));
    }

    #[test]
    fn rejects_truncated_archive() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("0001.csv.gzip");
        let bytes = gzip(b"safetyreportid\n1\n2\n3\n");
        std::fs::write(&path, &bytes[..bytes.len() - 4]).expect("write");
        assert!(verify_all(std::slice::from_ref(&path)).is_err());
    }
}
