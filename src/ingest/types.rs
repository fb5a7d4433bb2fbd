use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::hashing::ContentIdentity;
use crate::transport::TransportClass;

/// Request to ingest a batch of source roots into a collection
#[derive(Debug)]
pub enum IngestRequest {
    IngestBatch {
        session_id: String,
        roots: Vec<PathBuf>,
        collection_id: String,
    },
    Shutdown,
}

/// Terminal outcome of one file within a session.
///
/// A duplicate is not an error: it is the normal terminal state meaning no
/// new bytes were written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FileOutcome {
    Succeeded {
        identity: ContentIdentity,
        archive_path: PathBuf,
    },
    Duplicate {
        identity: ContentIdentity,
        duplicate_of: PathBuf,
    },
    Failed {
        reason: String,
    },
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    pub fn identity(&self) -> Option<&ContentIdentity> {
        match self {
            FileOutcome::Succeeded { identity, .. } => Some(identity),
            FileOutcome::Duplicate { identity, .. } => Some(identity),
            FileOutcome::Failed { .. } => None,
        }
    }
}

/// One entry per source file discovered by the scanner.
///
/// The identity stays empty until the hasher (local) or the fused copier
/// (network) fills it in. Once `outcome` is set the descriptor is terminal
/// and never mutated again.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Original absolute path of the source file
    pub path: PathBuf,
    /// Size in bytes, from scan metadata
    pub size: u64,
    /// Modification time, from scan metadata
    pub modified: Option<SystemTime>,
    /// Transport class of the session's sources
    pub transport: TransportClass,
    /// Content identity, filled in by the hashing or copying phase
    pub identity: Option<ContentIdentity>,
    /// Terminal outcome, set exactly once
    pub outcome: Option<FileOutcome>,
}

impl FileDescriptor {
    pub fn new(path: PathBuf, size: u64, modified: Option<SystemTime>, transport: TransportClass) -> Self {
        FileDescriptor {
            path,
            size,
            modified,
            transport,
            identity: None,
            outcome: None,
        }
    }
}

/// Progress updates emitted during a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum IngestProgress {
    SessionStarted {
        session_id: String,
        files_scanned: usize,
    },
    /// One per file reaching a terminal state, in completion order.
    FileCompleted {
        session_id: String,
        path: PathBuf,
        identity: Option<ContentIdentity>,
        outcome: FileOutcomeKind,
        bytes_processed: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_reason: Option<String>,
    },
    SessionFinished {
        session_id: String,
        status: String,
        metrics: super::session::SessionMetrics,
    },
}

impl IngestProgress {
    pub fn session_id(&self) -> &str {
        match self {
            IngestProgress::SessionStarted { session_id, .. } => session_id,
            IngestProgress::FileCompleted { session_id, .. } => session_id,
            IngestProgress::SessionFinished { session_id, .. } => session_id,
        }
    }
}

/// Collapsed outcome kind for progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcomeKind {
    Succeeded,
    Duplicate,
    Failed,
}

impl From<&FileOutcome> for FileOutcomeKind {
    fn from(outcome: &FileOutcome) -> Self {
        match outcome {
            FileOutcome::Succeeded { .. } => FileOutcomeKind::Succeeded,
            FileOutcome::Duplicate { .. } => FileOutcomeKind::Duplicate,
            FileOutcome::Failed { .. } => FileOutcomeKind::Failed,
        }
    }
}
