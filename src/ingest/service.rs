// # Ingest Service - Orchestrator
//
// Sequences one pipeline per import request: scan -> classify -> strategy
// phases -> validate -> finalize. The transport classification picks the
// strategy once per session; per-phase worker counts come from the hardware
// profile resolved at startup. Failures stay scoped to individual files;
// the session-level status is a summary of per-file outcomes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::progress::{IngestProgressService, ProgressSink};
use super::session::{IngestSession, SessionPhase};
use super::strategy::{strategy_for, FileState, StrategyDeps};
use super::types::{FileDescriptor, FileOutcome, IngestProgress, IngestRequest};
use super::validator::{validate_published, ValidationError};
use crate::db::{DbArchiveEntry, InsertOutcome};
use crate::index::ArchiveIndex;
use crate::profile::WorkerProfile;
use crate::scanner::scan_roots;
use crate::store::{archive_file_name, ArchiveStore};
use crate::transport::{classify_path, classify_roots};

type CancelRegistry = Arc<Mutex<HashMap<String, watch::Sender<bool>>>>;

/// Handle for submitting ingest requests and subscribing to progress updates
#[derive(Clone)]
pub struct IngestServiceHandle {
    request_tx: mpsc::UnboundedSender<IngestRequest>,
    progress_service: IngestProgressService,
    cancel_registry: CancelRegistry,
}

impl IngestServiceHandle {
    /// Queue a batch for ingestion, returning the new session's id.
    pub fn submit(
        &self,
        roots: Vec<PathBuf>,
        collection_id: impl Into<String>,
    ) -> Result<String, String> {
        let (session_id, _events) = self.submit_with_events(roots, collection_id)?;
        Ok(session_id)
    }

    /// Queue a batch and subscribe to its events in one step.
    ///
    /// The subscription is registered before the request is sent, so even a
    /// session that finishes instantly cannot emit events the caller misses.
    pub fn submit_with_events(
        &self,
        roots: Vec<PathBuf>,
        collection_id: impl Into<String>,
    ) -> Result<(String, mpsc::UnboundedReceiver<IngestProgress>), String> {
        let session_id = Uuid::new_v4().to_string();

        let (cancel_tx, _cancel_rx) = watch::channel(false);
        self.cancel_registry
            .lock()
            .unwrap()
            .insert(session_id.clone(), cancel_tx);

        let events = self.progress_service.subscribe_session(session_id.clone());

        self.request_tx
            .send(IngestRequest::IngestBatch {
                session_id: session_id.clone(),
                roots,
                collection_id: collection_id.into(),
            })
            .map_err(|e| format!("Failed to send ingest request: {}", e))?;

        Ok((session_id, events))
    }

    /// Cooperatively cancel a session. In-flight file operations finish or
    /// fail naturally; no new files are admitted to any phase.
    pub fn cancel_session(&self, session_id: &str) {
        if let Some(cancel_tx) = self.cancel_registry.lock().unwrap().get(session_id) {
            let _ = cancel_tx.send(true);
        }
    }

    /// Subscribe to progress updates for a specific session
    pub fn subscribe_session(
        &self,
        session_id: String,
    ) -> mpsc::UnboundedReceiver<IngestProgress> {
        self.progress_service.subscribe_session(session_id)
    }

    /// Subscribe to all progress updates (telemetry sink)
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<IngestProgress> {
        self.progress_service.subscribe_all()
    }

    /// Stop the service after the current session drains.
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(IngestRequest::Shutdown);
    }
}

/// Ingest service that runs the pipeline on the shared runtime
pub struct IngestService {
    store: ArchiveStore,
    index: ArchiveIndex,
    profile: WorkerProfile,
    local_volumes: Vec<String>,
    progress_tx: mpsc::UnboundedSender<IngestProgress>,
    request_rx: mpsc::UnboundedReceiver<IngestRequest>,
    cancel_registry: CancelRegistry,
}

impl IngestService {
    /// Start the service worker, returning a handle for requests and
    /// subscriptions.
    pub fn start(
        store: ArchiveStore,
        index: ArchiveIndex,
        profile: WorkerProfile,
        local_volumes: Vec<String>,
    ) -> IngestServiceHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let cancel_registry: CancelRegistry = Arc::new(Mutex::new(HashMap::new()));

        let service = IngestService {
            store,
            index,
            profile,
            local_volumes,
            progress_tx,
            request_rx,
            cancel_registry: cancel_registry.clone(),
        };

        tokio::spawn(service.listen_for_requests());

        let progress_service = IngestProgressService::new(progress_rx);

        IngestServiceHandle {
            request_tx,
            progress_service,
            cancel_registry,
        }
    }

    async fn listen_for_requests(mut self) {
        info!("Ingest service started");

        // Crash recovery: orphaned staged files from a previous run
        if let Err(e) = self.store.sweep_staging().await {
            warn!("Startup staging sweep failed: {}", e);
        }

        loop {
            match self.request_rx.recv().await {
                Some(IngestRequest::IngestBatch {
                    session_id,
                    roots,
                    collection_id,
                }) => {
                    self.run_session(session_id.clone(), roots, collection_id)
                        .await;
                    self.cancel_registry.lock().unwrap().remove(&session_id);
                }
                Some(IngestRequest::Shutdown) | None => {
                    info!("Ingest service shutting down");
                    break;
                }
            }
        }
    }

    /// Run one session end to end. Never returns an error: every failure is
    /// captured in per-file outcomes and the session summary.
    async fn run_session(&self, session_id: String, roots: Vec<PathBuf>, collection_id: String) {
        let sink = ProgressSink::new(session_id.clone(), self.progress_tx.clone());

        // Phase: scan the roots into a flat descriptor list
        let scan = scan_roots(&roots);
        for scan_error in &scan.errors {
            warn!("Session {}: scan error: {}", session_id, scan_error);
        }

        // Phase: classify transports; the most network-like source governs
        // the whole session
        let source_transport = classify_roots(&roots, &self.local_volumes);
        let dest_transport = classify_path(self.store.root(), &self.local_volumes);

        let mut session = IngestSession::new(session_id.clone(), collection_id, source_transport);
        session.enter_phase(SessionPhase::Classifying);
        session.set_scan_errors(scan.errors.len());

        let files: Vec<FileState> = scan
            .files
            .into_iter()
            .map(|f| {
                FileState::new(FileDescriptor::new(
                    f.path,
                    f.size,
                    f.modified,
                    source_transport,
                ))
            })
            .collect();

        sink.session_started(files.len());

        let cancel_rx = self.cancel_receiver(&session_id);
        let deps = StrategyDeps {
            store: self.store.clone(),
            index: self.index.clone(),
            profile: self.profile,
            source_transport,
            dest_transport,
            cancel: cancel_rx,
        };

        // Strategy phases: hash/dedup/copy in per-transport order
        let strategy = strategy_for(source_transport);
        info!(
            "Session {}: {} file(s), {} strategy",
            session_id,
            files.len(),
            strategy.name()
        );
        let files = strategy.prepare(&mut session, files, &deps, &sink).await;

        // Phase: independent re-hash of everything published
        session.enter_phase(SessionPhase::Validating);
        let mut files = self.validate_phase(files, &deps, &sink, &session).await;

        // Finalize: cancellation cleanup, counters, terminal status
        if deps.is_cancelled() {
            session.mark_cancelled();
            self.cleanup_cancelled(&mut files).await;
        }

        for state in &files {
            if let Some(outcome) = &state.descriptor.outcome {
                session.record_outcome(outcome, state.bytes_processed);
            }
        }
        session.files = files.into_iter().map(|s| s.descriptor).collect();

        let status = session.finish();
        let metrics = session.metrics();
        info!(
            "Session {}: {} ({} succeeded, {} duplicate(s), {} failed, {} bytes)",
            session_id,
            status.as_str(),
            metrics.succeeded,
            metrics.duplicates,
            metrics.failed,
            metrics.bytes_processed
        );
        for descriptor in session.files.iter() {
            if let Some(FileOutcome::Failed { reason }) = &descriptor.outcome {
                error!("Session {}: {:?} failed: {}", session_id, descriptor.path, reason);
            }
        }

        sink.session_finished(status, metrics);
    }

    /// Validate published files under the destination's worker limit, then
    /// record each survivor in the identity index.
    ///
    /// An `AlreadyExists` insert means a file with identical content won the
    /// race after this file's dedup check. The file is reported as a
    /// duplicate and its bytes stay where they are: the winning entry points
    /// at the very same identity-named path.
    async fn validate_phase(
        &self,
        files: Vec<FileState>,
        deps: &StrategyDeps,
        sink: &ProgressSink,
        session: &IngestSession,
    ) -> Vec<FileState> {
        let workers = self.profile.validate_workers(deps.dest_transport);
        let collection_id = session.collection_id.clone();

        stream::iter(files)
            .map(|mut state| {
                let collection_id = collection_id.clone();
                async move {
                    if state.is_terminal() || deps.is_cancelled() {
                        return state;
                    }
                    let (identity, published) = match (&state.descriptor.identity, &state.published)
                    {
                        (Some(identity), Some(published)) => {
                            (identity.clone(), published.clone())
                        }
                        _ => return state,
                    };

                    match validate_published(&deps.store, &published, &identity).await {
                        Ok(()) => {
                            let relative = archive_file_name(&identity, &state.descriptor.path);
                            let entry = DbArchiveEntry::new(
                                identity.as_str(),
                                &relative,
                                state.descriptor.size,
                                &collection_id,
                            );
                            match deps.index.record(&entry).await {
                                Ok(InsertOutcome::Inserted) => {
                                    state.descriptor.outcome = Some(FileOutcome::Succeeded {
                                        identity,
                                        archive_path: PathBuf::from(relative),
                                    });
                                    sink.file_completed(&state);
                                }
                                Ok(InsertOutcome::AlreadyExists) => {
                                    state.descriptor.outcome = Some(FileOutcome::Duplicate {
                                        identity,
                                        duplicate_of: PathBuf::from(relative),
                                    });
                                    sink.file_completed(&state);
                                }
                                Err(e) => {
                                    state.descriptor.outcome = Some(FileOutcome::Failed {
                                        reason: format!("Failed to record entry: {}", e),
                                    });
                                    sink.file_completed(&state);
                                }
                            }
                        }
                        Err(ValidationError::Corrupt { expected, actual }) => {
                            state.descriptor.outcome = Some(FileOutcome::Failed {
                                reason: format!(
                                    "Corruption detected: destination hashed to {}, expected {}",
                                    actual, expected
                                ),
                            });
                            sink.file_completed(&state);
                        }
                        Err(ValidationError::Io(e)) => {
                            state.descriptor.outcome = Some(FileOutcome::Failed {
                                reason: format!("Validation read failed: {}", e),
                            });
                            sink.file_completed(&state);
                        }
                    }
                    state
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    /// Remove everything a cancelled session left behind: staged partials
    /// and published-but-unvalidated copies no index entry refers to.
    async fn cleanup_cancelled(&self, files: &mut [FileState]) {
        for state in files.iter_mut() {
            if let Some(staged) = state.staged.take() {
                let _ = self.store.discard(&staged).await;
            }
            if state.descriptor.outcome.is_none() {
                if let Some(published) = state.published.take() {
                    let _ = self.store.remove(&published).await;
                }
            }
        }
        if let Err(e) = self.store.sweep_staging().await {
            warn!("Cancellation staging sweep failed: {}", e);
        }
    }

    fn cancel_receiver(&self, session_id: &str) -> watch::Receiver<bool> {
        let mut registry = self.cancel_registry.lock().unwrap();
        registry
            .entry(session_id.to_string())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }
}
