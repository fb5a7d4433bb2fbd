//! Per-transport execution strategies.
//!
//! Both strategies implement the same per-file result contract; the
//! orchestrator picks one per session from the transport classification and
//! never branches on transport again. The local strategy hashes ahead of the
//! copy so duplicates never cause a write; the network strategy fuses the
//! hash into the single streaming read and dedups afterwards, trading one
//! wasted local write for the one-network-read-per-file guarantee.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::copier::{copy_local, copy_network_fused};
use super::progress::ProgressSink;
use super::session::{IngestSession, SessionPhase};
use super::types::{FileDescriptor, FileOutcome};
use crate::hashing::hash_file;
use crate::index::{ArchiveIndex, DedupDecision};
use crate::profile::WorkerProfile;
use crate::store::ArchiveStore;
use crate::transport::TransportClass;

/// Shared per-session dependencies handed to a strategy.
pub struct StrategyDeps {
    pub store: ArchiveStore,
    pub index: ArchiveIndex,
    pub profile: WorkerProfile,
    pub source_transport: TransportClass,
    pub dest_transport: TransportClass,
    pub cancel: watch::Receiver<bool>,
}

impl StrategyDeps {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Per-file pipeline state threaded through the phases.
///
/// `staged` and `published` track where the bytes currently live; a file
/// with an outcome set is terminal and skipped by every later phase.
pub struct FileState {
    pub descriptor: FileDescriptor,
    pub staged: Option<PathBuf>,
    pub published: Option<PathBuf>,
    pub bytes_processed: u64,
}

impl FileState {
    pub fn new(descriptor: FileDescriptor) -> Self {
        FileState {
            descriptor,
            staged: None,
            published: None,
            bytes_processed: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.descriptor.outcome.is_some()
    }

    fn fail(&mut self, reason: String, sink: &ProgressSink) {
        self.descriptor.outcome = Some(FileOutcome::Failed { reason });
        sink.file_completed(self);
    }

    fn mark_duplicate(&mut self, duplicate_of: PathBuf, sink: &ProgressSink) {
        let identity = self
            .descriptor
            .identity
            .clone()
            .expect("duplicate decision requires an identity");
        self.descriptor.outcome = Some(FileOutcome::Duplicate {
            identity,
            duplicate_of,
        });
        sink.file_completed(self);
    }
}

/// Phases between scanning and validation, in transport order.
///
/// On return every file is either terminal or published and awaiting
/// validation.
#[async_trait]
pub trait IngestStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn prepare(
        &self,
        session: &mut IngestSession,
        files: Vec<FileState>,
        deps: &StrategyDeps,
        sink: &ProgressSink,
    ) -> Vec<FileState>;
}

/// Select the strategy for a session. Called once per session.
pub fn strategy_for(transport: TransportClass) -> Box<dyn IngestStrategy> {
    match transport {
        TransportClass::Local => Box::new(LocalStrategy),
        TransportClass::Network => Box::new(NetworkStrategy),
    }
}

// ============================================================================
// Local strategy: hash ahead, dedup before any write
// ============================================================================

pub struct LocalStrategy;

#[async_trait]
impl IngestStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(
        &self,
        session: &mut IngestSession,
        files: Vec<FileState>,
        deps: &StrategyDeps,
        sink: &ProgressSink,
    ) -> Vec<FileState> {
        // Phase: hash every file ahead of the copy
        session.enter_phase(SessionPhase::Hashing);
        let files = hash_phase(files, deps, sink).await;

        // Phase: consult the index before writing anything
        session.enter_phase(SessionPhase::Deduplicating);
        let files = dedup_before_copy(files, deps, sink).await;

        // Phase: copy the new content into staging and publish
        session.enter_phase(SessionPhase::Copying);
        copy_phase_local(files, deps, sink).await
    }
}

/// Hash all non-terminal files under the hash worker limit.
async fn hash_phase(files: Vec<FileState>, deps: &StrategyDeps, sink: &ProgressSink) -> Vec<FileState> {
    let workers = deps.profile.hash_workers;
    debug!("Hashing with {} worker(s)", workers);

    stream::iter(files)
        .map(|mut state| async move {
            if state.is_terminal() || deps.is_cancelled() {
                return state;
            }
            match hash_file(&state.descriptor.path).await {
                Ok(identity) => {
                    state.descriptor.identity = Some(identity);
                    state.bytes_processed += state.descriptor.size;
                }
                Err(e) => {
                    state.fail(
                        format!("Failed to hash {:?}: {}", state.descriptor.path, e),
                        sink,
                    );
                }
            }
            state
        })
        .buffer_unordered(workers)
        .collect()
        .await
}

/// Index pre-check: a known identity never reaches the copier.
async fn dedup_before_copy(
    files: Vec<FileState>,
    deps: &StrategyDeps,
    sink: &ProgressSink,
) -> Vec<FileState> {
    let mut checked = Vec::with_capacity(files.len());

    for mut state in files {
        if state.is_terminal() || deps.is_cancelled() {
            checked.push(state);
            continue;
        }
        let identity = match &state.descriptor.identity {
            Some(identity) => identity.clone(),
            None => {
                checked.push(state);
                continue;
            }
        };

        match deps.index.check(&identity).await {
            Ok(DedupDecision::DuplicateOf(entry)) => {
                debug!(
                    "{:?} is a duplicate of {} (skipping copy)",
                    state.descriptor.path, entry.archive_path
                );
                state.mark_duplicate(PathBuf::from(entry.archive_path), sink);
            }
            Ok(DedupDecision::New) => {}
            Err(e) => {
                state.fail(format!("Index lookup failed: {}", e), sink);
            }
        }
        checked.push(state);
    }

    checked
}

/// Copy phase for local sources: plain byte copy, identity already known.
async fn copy_phase_local(
    files: Vec<FileState>,
    deps: &StrategyDeps,
    sink: &ProgressSink,
) -> Vec<FileState> {
    let workers = deps
        .profile
        .copy_workers(deps.source_transport, deps.dest_transport);
    debug!("Copying with {} worker(s)", workers);

    stream::iter(files)
        .map(|mut state| async move {
            if state.is_terminal() || deps.is_cancelled() {
                return state;
            }
            let identity = state
                .descriptor
                .identity
                .clone()
                .expect("local copy runs after hashing");

            let staged = deps.store.stage_path();
            match copy_local(&state.descriptor.path, &staged).await {
                Ok(_bytes) => {
                    state.staged = Some(staged.clone());
                    match deps
                        .store
                        .publish(&staged, &identity, &state.descriptor.path)
                        .await
                    {
                        Ok(published) => {
                            state.staged = None;
                            state.published = Some(published);
                        }
                        Err(e) => {
                            let _ = deps.store.discard(&staged).await;
                            state.staged = None;
                            state.fail(format!("Failed to publish: {}", e), sink);
                        }
                    }
                }
                Err(e) => {
                    let _ = deps.store.discard(&staged).await;
                    state.fail(
                        format!("Failed to copy {:?}: {}", state.descriptor.path, e),
                        sink,
                    );
                }
            }
            state
        })
        .buffer_unordered(workers)
        .collect()
        .await
}

// ============================================================================
// Network strategy: fused copy+hash, dedup after the stream
// ============================================================================

pub struct NetworkStrategy;

#[async_trait]
impl IngestStrategy for NetworkStrategy {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn prepare(
        &self,
        session: &mut IngestSession,
        files: Vec<FileState>,
        deps: &StrategyDeps,
        sink: &ProgressSink,
    ) -> Vec<FileState> {
        // Phase: one streaming read per file, hash fused into the copy
        session.enter_phase(SessionPhase::Copying);
        let files = copy_phase_network(files, deps, sink).await;

        // Phase: identity is now known; dedup and publish survivors
        session.enter_phase(SessionPhase::Deduplicating);
        dedup_after_copy(files, deps, sink).await
    }
}

/// Fused copy+hash under the network worker limit.
async fn copy_phase_network(
    files: Vec<FileState>,
    deps: &StrategyDeps,
    sink: &ProgressSink,
) -> Vec<FileState> {
    let workers = deps
        .profile
        .copy_workers(deps.source_transport, deps.dest_transport);
    info!("Streaming network sources with {} worker(s)", workers);

    stream::iter(files)
        .map(|mut state| async move {
            if state.is_terminal() || deps.is_cancelled() {
                return state;
            }

            let staged = deps.store.stage_path();
            match copy_network_fused(&state.descriptor.path, &staged).await {
                Ok((identity, bytes)) => {
                    state.descriptor.identity = Some(identity);
                    state.bytes_processed += bytes;
                    state.staged = Some(staged);
                }
                Err(e) => {
                    let _ = deps.store.discard(&staged).await;
                    state.fail(
                        format!("Failed to stream {:?}: {}", state.descriptor.path, e),
                        sink,
                    );
                }
            }
            state
        })
        .buffer_unordered(workers)
        .collect()
        .await
}

/// Post-copy dedup: a duplicate's staged copy is deleted, a new identity's
/// staged copy is published. One wasted local write per duplicate, never a
/// second network read.
async fn dedup_after_copy(
    files: Vec<FileState>,
    deps: &StrategyDeps,
    sink: &ProgressSink,
) -> Vec<FileState> {
    let mut checked = Vec::with_capacity(files.len());

    for mut state in files {
        if state.is_terminal() {
            checked.push(state);
            continue;
        }
        let (identity, staged) = match (&state.descriptor.identity, &state.staged) {
            (Some(identity), Some(staged)) => (identity.clone(), staged.clone()),
            _ => {
                checked.push(state);
                continue;
            }
        };

        // A cancelled session still cleans up its staged bytes
        if deps.is_cancelled() {
            let _ = deps.store.discard(&staged).await;
            state.staged = None;
            checked.push(state);
            continue;
        }

        match deps.index.check(&identity).await {
            Ok(DedupDecision::DuplicateOf(entry)) => {
                debug!(
                    "{:?} is a duplicate of {} (discarding staged copy)",
                    state.descriptor.path, entry.archive_path
                );
                if let Err(e) = deps.store.discard(&staged).await {
                    warn!("Failed to discard staged duplicate: {}", e);
                }
                state.staged = None;
                state.mark_duplicate(PathBuf::from(entry.archive_path), sink);
            }
            Ok(DedupDecision::New) => {
                match deps
                    .store
                    .publish(&staged, &identity, &state.descriptor.path)
                    .await
                {
                    Ok(published) => {
                        state.staged = None;
                        state.published = Some(published);
                    }
                    Err(e) => {
                        let _ = deps.store.discard(&staged).await;
                        state.staged = None;
                        state.fail(format!("Failed to publish: {}", e), sink);
                    }
                }
            }
            Err(e) => {
                let _ = deps.store.discard(&staged).await;
                state.staged = None;
                state.fail(format!("Index lookup failed: {}", e), sink);
            }
        }
        checked.push(state);
    }

    checked
}
