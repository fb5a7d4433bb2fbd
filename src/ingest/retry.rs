//! Retry policy for transient transport errors.
//!
//! Constrained remote-file protocols fail with connection-level errors under
//! momentary load; those are retried a fixed number of times with increasing
//! backoff before being reclassified as permanent. Permission, not-found and
//! disk-full errors fail immediately: retrying them cannot help.

use std::future::Future;
use std::io;
use std::time::Duration;

use tracing::warn;

/// Retries after the first attempt.
pub const MAX_RETRIES: usize = 3;

/// Backoff before each retry.
const BACKOFF_SCHEDULE: [Duration; MAX_RETRIES] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Whether an I/O error is a transient transport condition worth retrying.
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::Interrupted
    )
}

/// Run an I/O operation, retrying transient failures per the backoff
/// schedule. A transient error that survives every retry is returned as-is,
/// now treated as permanent by the caller.
pub async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                let backoff = BACKOFF_SCHEDULE[attempt];
                attempt += 1;
                warn!(
                    "{}: transient error ({}), retry {}/{} in {:?}",
                    label, e, attempt, MAX_RETRIES, backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
