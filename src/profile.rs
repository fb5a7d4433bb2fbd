//! Per-phase worker counts keyed by machine capability and transport class.
//!
//! Resolved once at startup and passed explicitly into the pipeline so
//! scheduling stays deterministic. Network-phase counts are fixed small
//! values on every tier: the concurrent-operation ceiling of a remote-file
//! protocol is set by the protocol, not by available bandwidth, and
//! exceeding it drops the connection rather than slowing it down.

use crate::transport::TransportClass;

/// Machine capability tier, resolved by an external probe at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityTier {
    /// Low-core or memory-starved machines.
    Constrained,
    /// Typical desktop.
    Standard,
    /// Many-core workstation with fast local storage.
    Performance,
}

/// Worker counts for each pipeline phase.
#[derive(Debug, Clone, Copy)]
pub struct WorkerProfile {
    pub hash_workers: usize,
    pub copy_workers_local: usize,
    pub copy_workers_network: usize,
    pub validate_workers_local: usize,
    pub validate_workers_network: usize,
}

impl WorkerProfile {
    /// Static lookup for a capability tier. Not computed per file.
    pub fn for_tier(tier: CapabilityTier) -> Self {
        match tier {
            CapabilityTier::Constrained => WorkerProfile {
                hash_workers: 4,
                copy_workers_local: 4,
                copy_workers_network: 2,
                validate_workers_local: 4,
                validate_workers_network: 2,
            },
            CapabilityTier::Standard => WorkerProfile {
                hash_workers: 8,
                copy_workers_local: 8,
                copy_workers_network: 3,
                validate_workers_local: 8,
                validate_workers_network: 2,
            },
            CapabilityTier::Performance => WorkerProfile {
                hash_workers: 16,
                copy_workers_local: 12,
                copy_workers_network: 4,
                validate_workers_local: 12,
                validate_workers_network: 3,
            },
        }
    }

    /// Copy workers for a transfer. The network limit applies whenever either
    /// endpoint is network-attached.
    pub fn copy_workers(&self, source: TransportClass, destination: TransportClass) -> usize {
        if source.is_network() || destination.is_network() {
            self.copy_workers_network
        } else {
            self.copy_workers_local
        }
    }

    /// Validate workers, throttled by the destination volume only: validation
    /// re-reads the destination, so the source's transport is irrelevant.
    pub fn validate_workers(&self, destination: TransportClass) -> usize {
        if destination.is_network() {
            self.validate_workers_network
        } else {
            self.validate_workers_local
        }
    }
}
