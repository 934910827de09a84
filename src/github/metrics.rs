//! Client counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the retry pipeline.
#[derive(Debug, Default)]
pub(crate) struct ClientMetrics {
    requests: AtomicU64,
    retries: AtomicU64,
    reconnects: AtomicU64,
    rate_limit_waits: AtomicU64,
}

impl ClientMetrics {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limit_wait(&self) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the client counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientMetricsSnapshot {
    /// Attempts sent through the retry pipeline (probes excluded).
    pub requests: u64,
    /// Attempts after the first, across all operations.
    pub retries: u64,
    /// Connections force-closed after a transport failure.
    pub reconnects: u64,
    /// Sleeps taken to wait out a rate-limit window.
    pub rate_limit_waits: u64,
}
