// Content-Addressed Ingest Pipeline
//
// One session per import request: Scan -> Classify -> (Hash) -> Copy/Dedup
// -> Validate -> Finalize
//
// The transport classification selects one of two strategies for the whole
// batch:
// - Local sources: hash ahead of the copy, so a duplicate never causes a
//   write
// - Network sources: one streaming read per file feeds the destination and
//   the hasher together; dedup runs after the stream, when the identity is
//   first known
//
// Each phase runs with bounded parallelism from the hardware profile, and
// network-touching phases stay inside the remote protocol's fixed
// concurrency ceiling. No file is reported archived before the validator
// has independently re-hashed the destination bytes.

pub mod copier;
pub mod progress;
pub mod retry;
pub mod session;
pub mod service;
pub mod strategy;
pub mod types;
pub mod validator;

pub use progress::IngestProgressService;
pub use service::{IngestService, IngestServiceHandle};
pub use session::{SessionMetrics, SessionPhase, SessionStatus};
pub use types::{FileDescriptor, FileOutcome, FileOutcomeKind, IngestProgress, IngestRequest};
