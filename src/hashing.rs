//! Content identity hashing.
//!
//! Every archived file is named by a truncated BLAKE3 digest of its bytes.
//! The hasher is a stateful accumulator so the same code path serves both the
//! pull-ahead bulk hash (local sources) and the fused copy+hash stream
//! (network sources), where it is fed the exact chunks the copier writes.

use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hex characters in a content identity (64-bit truncation of the digest).
pub const IDENTITY_HEX_LEN: usize = 16;

/// Read buffer for bulk file hashing.
const HASH_READ_BUFFER_SIZE: usize = 64 * 1024;

/// A file's content identity: 16 lowercase hex chars of its BLAKE3 digest.
///
/// Two files with identical bytes always produce the same identity, and the
/// identity is the sole key used to test whether content is already archived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct an identity from its stored hex form (e.g. a database row).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentIdentity(hex.into())
    }
}

impl std::fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental content hasher.
///
/// Deterministic across chunk boundaries: feeding the same bytes in any
/// split yields the same identity.
#[derive(Default)]
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the byte stream.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Finish the stream and produce the identity.
    pub fn finalize(self) -> ContentIdentity {
        let digest = self.inner.finalize();
        ContentIdentity(hex::encode(&digest.as_bytes()[..IDENTITY_HEX_LEN / 2]))
    }
}

/// Hash a complete file with buffered incremental reads.
///
/// The pull-ahead path for local sources, where re-reading is cheap and the
/// identity is wanted before any copy is attempted.
pub async fn hash_file(path: &Path) -> std::io::Result<ContentIdentity> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; HASH_READ_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_fixed_length_hex() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello world");
        let identity = hasher.finalize();

        assert_eq!(identity.as_str().len(), IDENTITY_HEX_LEN);
        assert!(identity.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_independent_of_chunk_boundaries() {
        let mut bulk = ContentHasher::new();
        bulk.update(b"the quick brown fox jumps over the lazy dog");

        let mut chunked = ContentHasher::new();
        chunked.update(b"the quick brown ");
        chunked.update(b"fox jumps over");
        chunked.update(b" the lazy dog");

        assert_eq!(bulk.finalize(), chunked.finalize());
    }

    #[test]
    fn test_different_bytes_different_identity() {
        let mut a = ContentHasher::new();
        a.update(b"content a");
        let mut b = ContentHasher::new();
        b.update(b"content b");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[tokio::test]
    async fn test_hash_file_matches_incremental() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("sample.bin");
        let data = vec![7u8; 200_000]; // spans several read buffers
        std::fs::write(&path, &data).expect("Failed to write test file");

        let from_file = hash_file(&path).await.expect("Should hash file");

        let mut hasher = ContentHasher::new();
        hasher.update(&data);
        assert_eq!(from_file, hasher.finalize());
    }
}
