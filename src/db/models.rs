use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database models for the arca identity index.
///
/// A single table carries the whole contract: archive_entries maps a content
/// identity to the archived file that owns it. Rows are created only after a
/// file passes validation and are never updated in place; a re-import of
/// identical content reuses the existing row instead of creating a second one.

/// The permanent record of one successfully ingested, integrity-verified file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbArchiveEntry {
    /// Content identity (primary key): truncated BLAKE3 hex of the file bytes
    pub identity: String,
    /// Archive-relative path of the stored file (`<identity>.<ext>`)
    pub archive_path: String,
    /// Size of the stored file in bytes
    pub size_bytes: i64,
    /// Logical grouping the caller associated the file with
    pub collection_id: String,
    pub imported_at: DateTime<Utc>,
}

impl DbArchiveEntry {
    pub fn new(identity: &str, archive_path: &str, size_bytes: u64, collection_id: &str) -> Self {
        DbArchiveEntry {
            identity: identity.to_string(),
            archive_path: archive_path.to_string(),
            size_bytes: size_bytes as i64,
            collection_id: collection_id.to_string(),
            imported_at: Utc::now(),
        }
    }
}

/// Outcome of an insert-if-absent on the identity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The identity was new; this entry now owns it.
    Inserted,
    /// Another entry already holds this identity.
    AlreadyExists,
}
