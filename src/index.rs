//! Identity index: the Deduplicator's persistent backing store.
//!
//! Wraps the database with the two operations the pipeline needs: a lookup
//! to decide new-vs-duplicate, and an atomic insert-if-absent that records a
//! validated file. Shared across concurrent files within a session and
//! across sessions.

use thiserror::Error;

use crate::db::{Database, DbArchiveEntry, InsertOutcome};
use crate::hashing::ContentIdentity;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Decision for a candidate identity.
#[derive(Debug, Clone)]
pub enum DedupDecision {
    /// Content not yet archived.
    New,
    /// Content already archived; the existing entry is attached.
    DuplicateOf(DbArchiveEntry),
}

/// The persistent content-identity index.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    database: Database,
}

impl ArchiveIndex {
    pub fn new(database: Database) -> Self {
        ArchiveIndex { database }
    }

    /// Is this content already archived?
    ///
    /// The local strategy asks before copying (a duplicate never causes a
    /// write); the network strategy asks after its fused copy, when the
    /// identity first becomes known.
    pub async fn check(&self, identity: &ContentIdentity) -> Result<DedupDecision, IndexError> {
        match self.database.lookup_entry(identity.as_str()).await? {
            Some(entry) => Ok(DedupDecision::DuplicateOf(entry)),
            None => Ok(DedupDecision::New),
        }
    }

    /// Record a validated file, atomically, iff its identity is absent.
    ///
    /// `AlreadyExists` here means another file with identical content won the
    /// race after our pre-check; callers report that file as a duplicate.
    pub async fn record(&self, entry: &DbArchiveEntry) -> Result<InsertOutcome, IndexError> {
        Ok(self.database.insert_entry(entry).await?)
    }

    /// Fetch the entry currently holding an identity.
    pub async fn entry(
        &self,
        identity: &ContentIdentity,
    ) -> Result<Option<DbArchiveEntry>, IndexError> {
        Ok(self.database.lookup_entry(identity.as_str()).await?)
    }
}
