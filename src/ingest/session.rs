//! Import session: per-invocation state machine, counters and metrics.
//!
//! A session owns its file descriptors for its whole lifetime; collaborators
//! only see the progress events and the final summary. Phases move forward
//! only. The session-level status is a summary of per-file outcomes, never a
//! gate: one bad file cannot hold the batch hostage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{FileDescriptor, FileOutcome};
use crate::transport::TransportClass;

/// Pipeline phase a session is currently in.
///
/// Local sessions pass through every phase; network sessions skip `Hashing`
/// (the hash is a side effect of `Copying`) and dedup after the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Scanning,
    Classifying,
    Hashing,
    Deduplicating,
    Copying,
    Validating,
    Finalizing,
}

impl SessionPhase {
    /// Ordering rank within a session, per transport. Local sessions dedup
    /// before copying; network sessions only learn the identity from the
    /// copy, so they dedup after it.
    fn rank(self, transport: TransportClass) -> u8 {
        match (self, transport) {
            (SessionPhase::Scanning, _) => 0,
            (SessionPhase::Classifying, _) => 1,
            (SessionPhase::Hashing, _) => 2,
            (SessionPhase::Deduplicating, TransportClass::Local) => 3,
            (SessionPhase::Copying, TransportClass::Local) => 4,
            (SessionPhase::Copying, TransportClass::Network) => 3,
            (SessionPhase::Deduplicating, TransportClass::Network) => 4,
            (SessionPhase::Validating, _) => 5,
            (SessionPhase::Finalizing, _) => 6,
        }
    }
}

/// Terminal status of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Every attempted file succeeded or was a duplicate.
    Complete,
    /// At least one failure alongside at least one success.
    FailedPartial,
    /// At least one attempt, zero successes.
    Failed,
    /// Cooperatively cancelled; in-flight work was drained, staging swept.
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Complete => "complete",
            SessionStatus::FailedPartial => "failed-partial",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// Aggregate counters for a session, shaped for an external telemetry sink.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub files_scanned: usize,
    pub scan_errors: usize,
    pub succeeded: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub bytes_processed: u64,
    pub elapsed_ms: u64,
    pub throughput_bytes_per_sec: u64,
}

/// One invocation of the pipeline over a batch of source roots.
pub struct IngestSession {
    pub id: String,
    pub collection_id: String,
    pub source_transport: TransportClass,
    pub files: Vec<FileDescriptor>,
    phase: SessionPhase,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    scan_errors: usize,
    succeeded: usize,
    duplicates: usize,
    failed: usize,
    bytes_processed: u64,
    cancelled: bool,
}

impl IngestSession {
    pub fn new(id: String, collection_id: String, source_transport: TransportClass) -> Self {
        IngestSession {
            id,
            collection_id,
            source_transport,
            files: Vec::new(),
            phase: SessionPhase::Scanning,
            started_at: Utc::now(),
            finished_at: None,
            scan_errors: 0,
            succeeded: 0,
            duplicates: 0,
            failed: 0,
            bytes_processed: 0,
            cancelled: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to the next phase. Transitions are forward-only; a regressing
    /// call is a bug in the orchestrator and is ignored with a warning.
    pub fn enter_phase(&mut self, phase: SessionPhase) {
        if phase.rank(self.source_transport) < self.phase.rank(self.source_transport) {
            warn!(
                "Session {}: refusing phase regression {:?} -> {:?}",
                self.id, self.phase, phase
            );
            return;
        }
        debug!("Session {}: {:?} -> {:?}", self.id, self.phase, phase);
        self.phase = phase;
    }

    /// Record one file's terminal outcome and the bytes its processing read.
    pub fn record_outcome(&mut self, outcome: &FileOutcome, bytes_processed: u64) {
        match outcome {
            FileOutcome::Succeeded { .. } => self.succeeded += 1,
            FileOutcome::Duplicate { .. } => self.duplicates += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.bytes_processed += bytes_processed;
    }

    /// Per-path scan errors are non-fatal to the batch; they are surfaced in
    /// the metrics without affecting the terminal status.
    pub fn set_scan_errors(&mut self, count: usize) {
        self.scan_errors = count;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Close the session and compute its terminal status.
    ///
    /// Duplicates count as successes for status purposes: they are a normal
    /// terminal outcome meaning the content was already archived.
    pub fn finish(&mut self) -> SessionStatus {
        self.enter_phase(SessionPhase::Finalizing);
        self.finished_at = Some(Utc::now());

        if self.cancelled {
            return SessionStatus::Cancelled;
        }

        let non_failures = self.succeeded + self.duplicates;
        if self.failed == 0 {
            SessionStatus::Complete
        } else if non_failures > 0 {
            SessionStatus::FailedPartial
        } else {
            SessionStatus::Failed
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        let elapsed_ms = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;

        let throughput = if elapsed_ms > 0 {
            self.bytes_processed * 1000 / elapsed_ms
        } else {
            0
        };

        SessionMetrics {
            files_scanned: self.files.len(),
            scan_errors: self.scan_errors,
            succeeded: self.succeeded,
            duplicates: self.duplicates,
            failed: self.failed,
            bytes_processed: self.bytes_processed,
            elapsed_ms,
            throughput_bytes_per_sec: throughput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::ContentIdentity;
    use std::path::PathBuf;

    fn session() -> IngestSession {
        IngestSession::new("s-1".to_string(), "col".to_string(), TransportClass::Local)
    }

    fn succeeded() -> FileOutcome {
        FileOutcome::Succeeded {
            identity: ContentIdentity::from_hex("aa00aa00aa00aa00"),
            archive_path: PathBuf::from("aa00aa00aa00aa00.jpg"),
        }
    }

    fn failed() -> FileOutcome {
        FileOutcome::Failed {
            reason: "Permission denied".to_string(),
        }
    }

    fn duplicate() -> FileOutcome {
        FileOutcome::Duplicate {
            identity: ContentIdentity::from_hex("aa00aa00aa00aa00"),
            duplicate_of: PathBuf::from("aa00aa00aa00aa00.jpg"),
        }
    }

    #[test]
    fn test_zero_failures_is_complete() {
        let mut s = session();
        s.record_outcome(&succeeded(), 10);
        s.record_outcome(&duplicate(), 10);
        assert_eq!(s.finish(), SessionStatus::Complete);
    }

    #[test]
    fn test_mixed_outcomes_are_failed_partial() {
        let mut s = session();
        s.record_outcome(&succeeded(), 10);
        s.record_outcome(&failed(), 0);
        assert_eq!(s.finish(), SessionStatus::FailedPartial);
    }

    #[test]
    fn test_all_failures_is_failed() {
        let mut s = session();
        s.record_outcome(&failed(), 0);
        s.record_outcome(&failed(), 0);
        assert_eq!(s.finish(), SessionStatus::Failed);
    }

    #[test]
    fn test_duplicates_alone_complete_session() {
        let mut s = session();
        s.record_outcome(&duplicate(), 10);
        assert_eq!(s.finish(), SessionStatus::Complete);
    }

    #[test]
    fn test_duplicate_beside_failure_is_failed_partial() {
        let mut s = session();
        s.record_outcome(&duplicate(), 10);
        s.record_outcome(&failed(), 0);
        assert_eq!(s.finish(), SessionStatus::FailedPartial);
    }

    #[test]
    fn test_cancelled_wins_over_counters() {
        let mut s = session();
        s.record_outcome(&succeeded(), 10);
        s.mark_cancelled();
        assert_eq!(s.finish(), SessionStatus::Cancelled);
    }

    #[test]
    fn test_phase_is_forward_only() {
        let mut s = session();
        s.enter_phase(SessionPhase::Copying);
        s.enter_phase(SessionPhase::Hashing); // regression, ignored
        assert_eq!(s.phase(), SessionPhase::Copying);
    }

    #[test]
    fn test_metrics_counts() {
        let mut s = session();
        s.record_outcome(&succeeded(), 100);
        s.record_outcome(&duplicate(), 50);
        s.record_outcome(&failed(), 0);
        s.finish();

        let metrics = s.metrics();
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.duplicates, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.bytes_processed, 150);
    }
}
