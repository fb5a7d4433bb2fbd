// Shared fixtures for ingest integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use arca::db::Database;
use arca::index::ArchiveIndex;
use arca::ingest::{
    FileOutcomeKind, IngestProgress, IngestService, IngestServiceHandle, SessionMetrics,
};
use arca::profile::{CapabilityTier, WorkerProfile};
use arca::store::ArchiveStore;

/// A running ingest service over a throwaway archive root and database.
pub struct TestArchive {
    pub temp: TempDir,
    pub archive_root: PathBuf,
    pub source_root: PathBuf,
    pub handle: IngestServiceHandle,
}

pub async fn start_service() -> TestArchive {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let archive_root = temp.path().join("archive");
    let source_root = temp.path().join("source");
    std::fs::create_dir_all(&source_root).expect("Failed to create source dir");

    let store = ArchiveStore::new(&archive_root).expect("Failed to open archive store");
    let db_path = temp.path().join("test.db");
    let database = Database::new(&db_path.to_string_lossy())
        .await
        .expect("Failed to open database");
    let index = ArchiveIndex::new(database);
    let profile = WorkerProfile::for_tier(CapabilityTier::Standard);

    let handle = IngestService::start(store, index, profile, Vec::new());

    TestArchive {
        temp,
        archive_root,
        source_root,
        handle,
    }
}

/// One terminal file event, flattened for assertions.
#[derive(Debug, Clone)]
pub struct Completion {
    pub path: PathBuf,
    pub identity: Option<String>,
    pub outcome: FileOutcomeKind,
    pub bytes_processed: u64,
    pub error_reason: Option<String>,
}

#[derive(Debug)]
pub struct SessionResult {
    pub session_id: String,
    pub status: String,
    pub metrics: SessionMetrics,
    pub completions: Vec<Completion>,
}

impl SessionResult {
    pub fn completion_for(&self, path: &Path) -> &Completion {
        self.completions
            .iter()
            .find(|c| c.path == path)
            .unwrap_or_else(|| panic!("No completion event for {:?}", path))
    }

    pub fn count(&self, outcome: FileOutcomeKind) -> usize {
        self.completions
            .iter()
            .filter(|c| c.outcome == outcome)
            .count()
    }
}

/// Submit a batch and drain its events until the session finishes.
pub async fn run_to_completion(
    archive: &TestArchive,
    roots: Vec<PathBuf>,
    collection_id: &str,
) -> SessionResult {
    let (session_id, mut events) = archive
        .handle
        .submit_with_events(roots, collection_id)
        .expect("Failed to submit batch");

    let mut completions = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            IngestProgress::SessionStarted { .. } => {}
            IngestProgress::FileCompleted {
                path,
                identity,
                outcome,
                bytes_processed,
                error_reason,
                ..
            } => completions.push(Completion {
                path,
                identity: identity.map(|i| i.to_string()),
                outcome,
                bytes_processed,
                error_reason,
            }),
            IngestProgress::SessionFinished {
                status, metrics, ..
            } => {
                return SessionResult {
                    session_id,
                    status,
                    metrics,
                    completions,
                };
            }
        }
    }

    panic!("Progress channel closed before the session finished");
}

/// File names in the archive root, excluding the staging directory.
pub fn archived_file_names(archive_root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(archive_root)
        .expect("Failed to read archive root")
        .flatten()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Count of leftover files in the staging directory.
pub fn staging_leftovers(archive_root: &Path) -> usize {
    let staging = archive_root.join(".staging");
    std::fs::read_dir(staging)
        .map(|entries| entries.flatten().count())
        .unwrap_or(0)
}
