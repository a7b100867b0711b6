//! Atomic relay counters.
//!
//! Display-only counters served on `/api/stats`. They never feed back into
//! relay behavior, so every access uses `Relaxed` ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Default)]
struct StatsInner {
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    upstream_failures: AtomicU64,
    bytes_relayed: AtomicU64,
}

/// Thread-safe relay counters. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct RelayStats {
    inner: Arc<StatsInner>,
}

/// Point-in-time copy of the counters, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub upstream_failures: u64,
    pub bytes_relayed: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Request answered with 400 before any outbound call.
    pub fn inc_rejected(&self) {
        self.inner.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Request answered with 500 because the fetch failed.
    pub fn inc_upstream_failures(&self) {
        self.inner.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_relayed(&self, n: u64) {
        self.inner.bytes_relayed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.inner.rejected_requests.load(Ordering::Relaxed),
            upstream_failures: self.inner.upstream_failures.load(Ordering::Relaxed),
            bytes_relayed: self.inner.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}
