//! Transport classification for source and destination paths.
//!
//! Decides whether a path's underlying storage behaves as fast local disk or
//! as a constrained network share. The classification picks the execution
//! strategy for a whole session and the worker limits for every phase that
//! touches the path.

use std::path::Path;

/// Mount roots that usually hold network-attached volumes.
const NETWORK_MOUNT_ROOTS: &[&str] = &["/Volumes", "/mnt", "/media", "/net"];

/// Explicit network protocol prefixes.
const NETWORK_PROTOCOL_PREFIXES: &[&str] = &["smb://", "nfs://", "afp://", "ftp://", "webdav://"];

/// How a path's underlying storage behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// Internal or directly attached storage. High parallelism is safe.
    Local,
    /// Network-attached share. Concurrency is capped by the protocol,
    /// not by bandwidth.
    Network,
}

impl TransportClass {
    pub fn is_network(self) -> bool {
        matches!(self, TransportClass::Network)
    }
}

/// Check if a path is UNC-style (`\\server\share` or `//server/share`).
fn is_unc_path(path: &str) -> bool {
    path.starts_with("\\\\") || path.starts_with("//")
}

/// Check if a path carries an explicit network protocol prefix.
fn has_network_protocol_prefix(path: &str) -> bool {
    let lower = path.to_lowercase();
    NETWORK_PROTOCOL_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Extract the volume name if the path sits under a recognized mount root.
///
/// `/Volumes/Media/photos` yields `Some("Media")`; `/home/dima` yields `None`.
fn mounted_volume_name(path: &Path) -> Option<String> {
    let mut components = path.components();
    let root = components.next()?;
    if !matches!(root, std::path::Component::RootDir) {
        return None;
    }

    let first = components.next()?.as_os_str().to_str()?;
    let mount_root = format!("/{}", first);
    if !NETWORK_MOUNT_ROOTS.contains(&mount_root.as_str()) {
        return None;
    }

    components
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .map(|s| s.to_string())
}

/// Classify a single path as local or network storage.
///
/// UNC paths, protocol-prefixed paths, and paths under a network mount root
/// classify as `Network`. A volume whose name appears in `local_volumes`
/// (internal or solid-state volume labels) overrides the mount-root match
/// back to `Local`.
pub fn classify_path(path: &Path, local_volumes: &[String]) -> TransportClass {
    let raw = path.to_string_lossy();

    if is_unc_path(&raw) || has_network_protocol_prefix(&raw) {
        return TransportClass::Network;
    }

    if let Some(volume) = mounted_volume_name(path) {
        if local_volumes.iter().any(|v| v.eq_ignore_ascii_case(&volume)) {
            return TransportClass::Local;
        }
        return TransportClass::Network;
    }

    TransportClass::Local
}

/// Classify a batch of source roots.
///
/// The most network-like classification governs the whole session: a batch
/// with one network root runs under network limits end to end rather than
/// being split into mixed sub-pipelines.
pub fn classify_roots(roots: &[std::path::PathBuf], local_volumes: &[String]) -> TransportClass {
    if roots
        .iter()
        .any(|root| classify_path(root, local_volumes).is_network())
    {
        TransportClass::Network
    } else {
        TransportClass::Local
    }
}
