//! Post-copy validation: the integrity gate in front of the archive.
//!
//! Re-reads the published file and recomputes its identity independently of
//! whatever the copy phase produced. A mismatch is data corruption, not a
//! warning: the destination file is deleted on the spot so no other
//! component can ever treat it as complete. Nothing is reported archived
//! without passing here first.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error};

use crate::hashing::{hash_file, ContentIdentity};
use crate::store::ArchiveStore;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corruption detected: destination hashed to {actual}, expected {expected}")]
    Corrupt {
        expected: ContentIdentity,
        actual: ContentIdentity,
    },
}

/// Re-hash a published file and compare against its claimed identity.
///
/// On mismatch the destination is deleted before the error is returned, so
/// a corrupt copy never survives validation.
pub async fn validate_published(
    store: &ArchiveStore,
    published: &Path,
    expected: &ContentIdentity,
) -> Result<(), ValidationError> {
    let actual = hash_file(published).await?;

    if actual != *expected {
        error!(
            "Corruption at {:?}: hashed to {}, expected {}",
            published, actual, expected
        );
        store
            .remove(published)
            .await
            .map_err(|e| ValidationError::Io(std::io::Error::other(e)))?;
        return Err(ValidationError::Corrupt {
            expected: expected.clone(),
            actual,
        });
    }

    debug!("Validated {:?} as {}", published, expected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::ContentHasher;
    use tempfile::TempDir;

    fn identity_of(data: &[u8]) -> ContentIdentity {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    #[tokio::test]
    async fn test_intact_file_passes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ArchiveStore::new(temp_dir.path().join("archive")).unwrap();
        let data = b"intact content";
        let expected = identity_of(data);
        let published = store.root().join(format!("{}.bin", expected));
        std::fs::write(&published, data).unwrap();

        validate_published(&store, &published, &expected)
            .await
            .expect("Intact file should validate");
        assert!(published.exists());
    }

    #[tokio::test]
    async fn test_altered_file_is_rejected_and_deleted() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ArchiveStore::new(temp_dir.path().join("archive")).unwrap();
        let expected = identity_of(b"original content");
        let published = store.root().join(format!("{}.bin", expected));
        // Bytes were altered after the copy
        std::fs::write(&published, b"tampered content").unwrap();

        let result = validate_published(&store, &published, &expected).await;

        assert!(matches!(result, Err(ValidationError::Corrupt { .. })));
        assert!(!published.exists(), "Corrupt file must not survive");
    }
}
