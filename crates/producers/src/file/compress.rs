//! Background gzip compression of rotated files
//!
//! Runs on the blocking pool; the producer task only dispatches and,
//! at shutdown, waits. Errors stay inside the task: a failed compression
//! keeps the uncompressed source and removes the partial `.gz`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Chunk size for streaming compression; bounds memory per task
const CHUNK_SIZE: usize = 1 << 20;

/// Compress `source` into `target`, then delete the source
///
/// On any failure the partial target is removed and the source kept.
pub(crate) fn gzip_rotated(source: Arc<File>, source_path: PathBuf, target_path: PathBuf) {
    tracing::info!(file = %source_path.display(), "compressing rotated log");

    if let Err(err) = stream_gzip(&source, &target_path) {
        tracing::warn!(
            file = %source_path.display(),
            error = %err,
            "compression failed, keeping uncompressed file"
        );
        if let Err(err) = fs::remove_file(&target_path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::error!(
                    file = %target_path.display(),
                    error = %err,
                    "failed to remove partial compressed file"
                );
            }
        }
        return;
    }

    drop(source);
    if let Err(err) = fs::remove_file(&source_path) {
        tracing::error!(
            file = %source_path.display(),
            error = %err,
            "failed to remove uncompressed file"
        );
        return;
    }

    tracing::info!(file = %target_path.display(), "rotated log compressed");
}

fn stream_gzip(source: &File, target_path: &Path) -> io::Result<()> {
    let mut reader: &File = source;
    reader.seek(SeekFrom::Start(0))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    let target = options.open(target_path)?;

    let mut encoder = GzEncoder::new(target, Compression::default());
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&chunk[..n])?;
    }
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn test_compress_then_remove_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("app_2026-03-01_10.log");
        fs::write(&source_path, b"line one\nline two\n").unwrap();

        let source = Arc::new(File::open(&source_path).unwrap());
        let target_path = tmp.path().join("app_2026-03-01_10.gz");

        gzip_rotated(source, source_path.clone(), target_path.clone());

        assert!(!source_path.exists());
        assert!(target_path.exists());

        let mut decoder = GzDecoder::new(File::open(&target_path).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\nline two\n");
    }

    #[test]
    fn test_large_file_streams_in_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("big.log");
        let payload = vec![b'z'; CHUNK_SIZE * 2 + 123];
        fs::write(&source_path, &payload).unwrap();

        let source = Arc::new(File::open(&source_path).unwrap());
        let target_path = tmp.path().join("big.gz");
        gzip_rotated(source, source_path.clone(), target_path.clone());

        let mut decoder = GzDecoder::new(File::open(&target_path).unwrap());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_failure_keeps_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("keep.log");
        fs::write(&source_path, b"data").unwrap();

        let source = Arc::new(File::open(&source_path).unwrap());
        // Target inside a directory that does not exist.
        let target_path = tmp.path().join("missing-dir").join("keep.gz");
        gzip_rotated(source, source_path.clone(), target_path.clone());

        assert!(source_path.exists());
        assert!(!target_path.exists());
    }
}
