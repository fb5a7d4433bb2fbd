//! Copy phase: staged writes, with the network path fused to the hasher.
//!
//! Local sources are cheap to re-read, so their identity is computed ahead of
//! time and the copy is a plain byte-for-byte transfer. Network sources get
//! one streaming read that feeds the destination write and the content hasher
//! from the same chunks, so each byte crosses the link exactly once and the
//! identity falls out of the copy. Memory stays bounded at one chunk: the
//! destination write drains before the next read is issued, so the write
//! rate governs how fast the source is pulled.

use std::io;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use super::retry::with_retry;
use crate::hashing::{ContentHasher, ContentIdentity};

/// Stream chunk size for the fused copy.
const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Copy a local file whose identity is already known into a staged path.
///
/// Retried on transient errors; each attempt rewrites the staged file from
/// the start.
pub async fn copy_local(source: &Path, staged: &Path) -> io::Result<u64> {
    let bytes = with_retry("local copy", || async move {
        tokio::fs::copy(source, staged).await
    })
    .await?;

    debug!("Copied {:?} ({} bytes)", source, bytes);
    Ok(bytes)
}

/// Fused copy+hash for network sources.
///
/// Opens a single read stream, pipes every chunk to the staged destination
/// file and the content hasher, and returns the accumulated identity once the
/// stream completes. Exactly one full read of the source per successful
/// attempt. Retried on transient errors; a retry restarts the stream with a
/// fresh hasher and a truncated staged file.
pub async fn copy_network_fused(source: &Path, staged: &Path) -> io::Result<(ContentIdentity, u64)> {
    with_retry("network copy", || async move {
        stream_copy_and_hash(source, staged).await
    })
    .await
}

/// One attempt of the fused stream.
async fn stream_copy_and_hash(source: &Path, staged: &Path) -> io::Result<(ContentIdentity, u64)> {
    let source_file = tokio::fs::File::open(source).await?;
    let mut reader = BufReader::new(source_file);
    // Create truncates, so a retry never sees a previous attempt's bytes
    let mut writer = tokio::fs::File::create(staged).await?;

    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }

        writer.write_all(&buffer[..bytes_read]).await?;
        hasher.update(&buffer[..bytes_read]);
        total_bytes += bytes_read as u64;
    }

    writer.flush().await?;
    drop(writer);

    let identity = hasher.finalize();
    debug!(
        "Streamed {:?} ({} bytes) -> {}",
        source, total_bytes, identity
    );
    Ok((identity, total_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_file;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_local_is_byte_identical() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("source.bin");
        let staged = temp_dir.path().join("staged.part");
        let data = vec![3u8; 10_000];
        std::fs::write(&source, &data).unwrap();

        let bytes = copy_local(&source, &staged).await.unwrap();

        assert_eq!(bytes, data.len() as u64);
        assert_eq!(std::fs::read(&staged).unwrap(), data);
    }

    #[tokio::test]
    async fn test_fused_copy_identity_matches_pull_ahead_hash() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("source.bin");
        let staged = temp_dir.path().join("staged.part");
        // Spans multiple stream chunks
        let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &data).unwrap();

        let (identity, bytes) = copy_network_fused(&source, &staged).await.unwrap();

        assert_eq!(bytes, data.len() as u64);
        assert_eq!(std::fs::read(&staged).unwrap(), data);
        assert_eq!(identity, hash_file(&source).await.unwrap());
    }

    #[tokio::test]
    async fn test_fused_copy_empty_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("empty.bin");
        let staged = temp_dir.path().join("staged.part");
        std::fs::write(&source, b"").unwrap();

        let (identity, bytes) = copy_network_fused(&source, &staged).await.unwrap();

        assert_eq!(bytes, 0);
        assert_eq!(identity, hash_file(&source).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_staged_leftover() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("nope.bin");
        let staged = temp_dir.path().join("staged.part");

        let result = copy_network_fused(&source, &staged).await;

        assert!(result.is_err());
        assert!(!staged.exists());
    }
}
