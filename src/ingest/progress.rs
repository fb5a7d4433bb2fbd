use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

use super::session::{SessionMetrics, SessionStatus};
use super::strategy::FileState;
use super::types::{FileOutcomeKind, IngestProgress};

type SubscriptionId = u64;

/// Filter criteria for progress subscriptions
#[derive(Debug, Clone)]
enum SubscriptionFilter {
    /// Every event from every session (telemetry sink)
    All,
    /// Events from one session only
    Session { session_id: String },
}

impl SubscriptionFilter {
    fn matches(&self, progress: &IngestProgress) -> bool {
        match self {
            SubscriptionFilter::All => true,
            SubscriptionFilter::Session { session_id } => progress.session_id() == session_id,
        }
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    tx: tokio_mpsc::UnboundedSender<IngestProgress>,
}

/// Emits progress events for one session into the shared progress channel.
///
/// Handed to the pipeline phases so a file can be reported the moment it
/// reaches a terminal state, in completion order.
#[derive(Clone)]
pub struct ProgressSink {
    session_id: String,
    tx: tokio_mpsc::UnboundedSender<IngestProgress>,
}

impl ProgressSink {
    pub fn new(session_id: String, tx: tokio_mpsc::UnboundedSender<IngestProgress>) -> Self {
        ProgressSink { session_id, tx }
    }

    pub fn session_started(&self, files_scanned: usize) {
        let _ = self.tx.send(IngestProgress::SessionStarted {
            session_id: self.session_id.clone(),
            files_scanned,
        });
    }

    /// Report a file's terminal outcome.
    pub fn file_completed(&self, state: &FileState) {
        let outcome = match &state.descriptor.outcome {
            Some(outcome) => outcome,
            None => return,
        };

        let error_reason = match outcome {
            super::types::FileOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        };

        let _ = self.tx.send(IngestProgress::FileCompleted {
            session_id: self.session_id.clone(),
            path: state.descriptor.path.clone(),
            identity: state.descriptor.identity.clone(),
            outcome: FileOutcomeKind::from(outcome),
            bytes_processed: state.bytes_processed,
            error_reason,
        });
    }

    pub fn session_finished(&self, status: SessionStatus, metrics: SessionMetrics) {
        let _ = self.tx.send(IngestProgress::SessionFinished {
            session_id: self.session_id.clone(),
            status: status.as_str().to_string(),
            metrics,
        });
    }
}

/// Progress service that broadcasts ingest progress updates
#[derive(Clone)]
pub struct IngestProgressService {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl IngestProgressService {
    /// Create a new progress service and spawn a background task to dispatch
    /// progress updates to subscribers
    pub fn new(mut progress_rx: tokio_mpsc::UnboundedReceiver<IngestProgress>) -> Self {
        let subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let subscriptions_clone = subscriptions.clone();

        tokio::spawn(async move {
            loop {
                match progress_rx.recv().await {
                    Some(progress) => {
                        let mut subs = subscriptions_clone.lock().unwrap();
                        let mut to_remove = Vec::new();

                        for (id, subscription) in subs.iter() {
                            if subscription.filter.matches(&progress) {
                                // If send fails, receiver was dropped - mark for removal
                                if subscription.tx.send(progress.clone()).is_err() {
                                    to_remove.push(*id);
                                }
                            }
                        }

                        for id in to_remove {
                            subs.remove(&id);
                        }
                    }
                    None => {
                        debug!("Progress channel closed, exiting dispatcher");
                        break;
                    }
                }
            }
        });

        Self {
            subscriptions,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to progress updates for a specific session
    /// Subscription is automatically removed when the receiver is dropped
    pub fn subscribe_session(
        &self,
        session_id: String,
    ) -> tokio_mpsc::UnboundedReceiver<IngestProgress> {
        self.subscribe(SubscriptionFilter::Session { session_id })
    }

    /// Subscribe to every event from every session (telemetry sink)
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<IngestProgress> {
        self.subscribe(SubscriptionFilter::All)
    }

    fn subscribe(
        &self,
        filter: SubscriptionFilter,
    ) -> tokio_mpsc::UnboundedReceiver<IngestProgress> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, Subscription { filter, tx });
        rx
    }
}
