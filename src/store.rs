//! Archive store: the on-disk destination for ingested files.
//!
//! Files land in a `.staging/` directory first and only become visible under
//! their final `<identity>.<ext>` name via an atomic rename after the write
//! stream has closed. A crash mid-copy therefore never leaves a partial file
//! at a path other components might treat as complete. The hash-derived
//! naming is the whole filesystem contract: downstream subsystems locate
//! ingested bytes by identity alone.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hashing::ContentIdentity;

const STAGING_DIR_NAME: &str = ".staging";
const STAGING_SUFFIX: &str = "part";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive root is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),
}

/// Derive the archive file name for an identity and the source file's
/// extension: `<identity>.<ext>`, or bare `<identity>` when the source
/// has no extension. Extensions are lowercased.
pub fn archive_file_name(identity: &ContentIdentity, original_path: &Path) -> String {
    match original_path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", identity, ext.to_lowercase()),
        _ => identity.to_string(),
    }
}

/// Owns the destination root and its staging area.
///
/// Staging lives under the root so every publish is a same-filesystem rename.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    staging: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if needed) an archive store at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StoreError::InvalidRoot(root));
        }
        let staging = root.join(STAGING_DIR_NAME);
        std::fs::create_dir_all(&staging)?;

        Ok(ArchiveStore { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a unique staging path for an in-flight copy.
    pub fn stage_path(&self) -> PathBuf {
        self.staging
            .join(format!("{}.{}", Uuid::new_v4(), STAGING_SUFFIX))
    }

    /// The final path a given identity + source extension publishes to.
    pub fn archive_path(&self, identity: &ContentIdentity, original_path: &Path) -> PathBuf {
        self.root.join(archive_file_name(identity, original_path))
    }

    /// Atomically publish a fully written staged file under its identity name.
    ///
    /// If the target already exists it holds identical bytes (identity-named),
    /// so the rename simply replaces it.
    pub async fn publish(
        &self,
        staged: &Path,
        identity: &ContentIdentity,
        original_path: &Path,
    ) -> Result<PathBuf, StoreError> {
        let target = self.archive_path(identity, original_path);
        tokio::fs::rename(staged, &target).await?;
        debug!("Published {} -> {:?}", identity, target);
        Ok(target)
    }

    /// Remove a staged file that will not be published (duplicate or failure).
    pub async fn discard(&self, staged: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a published archive file (validation failure path).
    pub async fn remove(&self, archive_path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(archive_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sweep leftover `.part` files out of staging.
    ///
    /// Run at service startup (crash recovery) and after a cancelled session,
    /// before the session reports its terminal status.
    pub async fn sweep_staging(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.staging).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_part = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == STAGING_SUFFIX)
                .unwrap_or(false);
            if !is_part {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to sweep staged file {:?}: {}", path, e);
            } else {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {} staged file(s)", removed);
        }
        Ok(removed)
    }
}
