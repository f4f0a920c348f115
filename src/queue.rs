//! Per-device queue: the host-side surface over the sweep scheduler.
//!
//! The host block layer serializes every scheduler call on one queue under a
//! single lock it owns; the scheduler itself never locks. This module is that
//! host layer: it wraps a [`SweepScheduler`] in a `parking_lot::Mutex`, runs
//! the generic back-merge pass on submission, and feeds the metrics counters.
//! Distinct queues share nothing and may be driven concurrently.

use crate::metrics::QueueMetrics;
use crate::request::Request;
use crate::scheduler::look::{AddError, AttachError, RequestId, SweepScheduler};
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of submitting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The request entered the pending set as a new entry.
    Queued(RequestId),
    /// The request was absorbed by the pending request it extends; the id is
    /// the surviving request's.
    Merged(RequestId),
}

/// One attached device queue running the LOOK policy.
pub struct DeviceQueue {
    scheduler: Mutex<SweepScheduler>,
    metrics: Arc<QueueMetrics>,
}

impl DeviceQueue {
    /// Attach the LOOK policy to a new device queue.
    ///
    /// Allocation failure aborts the attachment and is reported to the
    /// caller.
    pub fn attach(metrics: Arc<QueueMetrics>) -> Result<DeviceQueue, AttachError> {
        Ok(DeviceQueue {
            scheduler: Mutex::new(SweepScheduler::new()?),
            metrics,
        })
    }

    /// Submit a request: sorted insert, then the host's generic merge pass.
    ///
    /// If the sector-order predecessor ends exactly where this request
    /// begins, the predecessor absorbs it (back merge) and the request never
    /// reaches the pending set as its own entry. An `Err` means the
    /// scheduler's order invariant is corrupted; the request comes back
    /// inside it.
    pub fn submit(&self, request: Request) -> Result<Submission, AddError> {
        self.metrics.record_submitted();
        let mut sched = self.scheduler.lock();

        let id = match sched.add(request) {
            Ok(id) => id,
            Err(err) => {
                log::error!("{err}");
                return Err(err);
            }
        };

        if let Some(prev) = sched.neighbor_before(id) {
            let adjacent = {
                let survivor = sched.get(prev).expect("neighbor is pending");
                let newcomer = sched.get(id).expect("just inserted");
                survivor.end_sector() == newcomer.sector()
            };
            if adjacent {
                let absorbed = sched
                    .merge_notify(prev, id)
                    .expect("absorbed request is pending");
                sched
                    .request_mut(prev)
                    .expect("surviving request is pending")
                    .extend(absorbed.sectors());
                self.metrics.record_merged();
                return Ok(Submission::Merged(prev));
            }
        }

        self.metrics.record_queued();
        Ok(Submission::Queued(id))
    }

    /// Remove and return the next request in LOOK order, recording the seek
    /// distance and any direction reversal.
    pub fn dispatch(&self) -> Option<Request> {
        let mut sched = self.scheduler.lock();
        let head_before = sched.last_sector();
        let direction_before = sched.direction();

        let request = sched.dispatch()?;

        if sched.direction() != direction_before {
            self.metrics.record_reversal();
        }
        drop(sched);

        self.metrics
            .record_dispatched(request.sector().abs_diff(head_before));
        Some(request)
    }

    /// O(1) idle check.
    pub fn queue_empty(&self) -> bool {
        self.scheduler.lock().is_empty()
    }

    /// Pending request count.
    pub fn pending(&self) -> usize {
        self.scheduler.lock().len()
    }

    /// Copy of the sector-order predecessor, wrap-aware.
    pub fn neighbor_before(&self, id: RequestId) -> Option<Request> {
        let sched = self.scheduler.lock();
        let prev = sched.neighbor_before(id)?;
        sched.get(prev).cloned()
    }

    /// Copy of the sector-order successor, wrap-aware.
    pub fn neighbor_after(&self, id: RequestId) -> Option<Request> {
        let sched = self.scheduler.lock();
        let next = sched.neighbor_after(id)?;
        sched.get(next).cloned()
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    /// Detach the policy from the queue.
    ///
    /// # Panics
    /// Panics if requests are still pending: the host failed to drain the
    /// queue before tearing it down.
    pub fn detach(self) {
        self.scheduler.into_inner().exit();
    }
}
