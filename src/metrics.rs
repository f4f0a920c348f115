//! Metrics for the I/O pipeline.
//!
//! Counters are plain atomics updated on the submit/dispatch hot paths;
//! aggregation happens only when a snapshot is taken. Relaxed ordering is
//! sufficient throughout: these are statistics, not synchronization.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counters for one device queue.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    submitted: AtomicU64,
    queued: AtomicU64,
    merged: AtomicU64,
    dispatched: AtomicU64,
    reversals: AtomicU64,
    seek_total: AtomicU64,
    seek_max: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Arc<QueueMetrics> {
        Arc::new(QueueMetrics::default())
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merged(&self) {
        self.merged.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatch and the head travel it cost.
    pub fn record_dispatched(&self, seek_distance: u64) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.seek_total.fetch_add(seek_distance, Ordering::Relaxed);
        self.seek_max.fetch_max(seek_distance, Ordering::Relaxed);
    }

    /// Record a sweep direction reversal.
    pub fn record_reversal(&self) {
        self.reversals.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let dispatched = self.dispatched.load(Ordering::Relaxed);
        let seek_total = self.seek_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            dispatched,
            reversals: self.reversals.load(Ordering::Relaxed),
            seek_total,
            seek_max: self.seek_max.load(Ordering::Relaxed),
            seek_mean: if dispatched == 0 {
                0.0
            } else {
                seek_total as f64 / dispatched as f64
            },
        }
    }
}

/// Serializable summary of queue activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests handed to the queue, merged or not.
    pub submitted: u64,
    /// Requests that entered the pending set as new entries.
    pub queued: u64,
    /// Requests absorbed by a pending neighbor instead of queueing.
    pub merged: u64,
    /// Requests handed to the driver.
    pub dispatched: u64,
    /// Sweep direction reversals observed at dispatch time.
    pub reversals: u64,
    /// Total head travel across all dispatches, in sectors.
    pub seek_total: u64,
    /// Longest single seek, in sectors.
    pub seek_max: u64,
    /// Mean seek distance per dispatch, in sectors.
    pub seek_mean: f64,
}
