//! Pipeline orchestration.
//!
//! Wires a workload source through the device queue to a simulated driver:
//! submitters call [`Pipeline::submit`], a dispatcher thread drains the queue
//! in LOOK order into a bounded channel that stands in for the device's
//! command slots, and a driver thread completes the transfers. The dispatcher
//! is the only caller of dispatch, and every scheduler call goes through the
//! queue's lock, matching the serialized host model.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::metrics::QueueMetrics;
use crate::queue::{DeviceQueue, Submission};
use crate::request::Request;
use crate::scheduler::look::{AddError, AttachError};

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the dispatcher → driver channel; models the device's
    /// outstanding-command depth and applies backpressure to the sweep.
    pub driver_depth: usize,
    /// Requests the dispatcher forwards per wakeup before rechecking the
    /// shutdown flag.
    pub dispatch_batch: usize,
    /// Back-off applied when the queue is idle.
    pub idle_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            driver_depth: 32,
            dispatch_batch: 16,
            idle_backoff: Duration::from_micros(50),
        }
    }
}

/// A device queue plus the dispatcher/driver threads that drive it.
pub struct Pipeline {
    queue: Arc<DeviceQueue>,
    metrics: Arc<QueueMetrics>,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Attach a queue and build an idle pipeline; `start` spawns the threads.
    pub fn new(config: PipelineConfig) -> Result<Pipeline, AttachError> {
        let metrics = QueueMetrics::new();
        let queue = Arc::new(DeviceQueue::attach(metrics.clone())?);
        Ok(Pipeline {
            queue,
            metrics,
            config,
            running: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicU64::new(0)),
            workers: Vec::new(),
        })
    }

    /// Spawn the dispatcher and driver threads.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let (to_driver, from_dispatcher) = bounded::<Request>(self.config.driver_depth);

        self.workers.push(spawn_dispatcher(
            self.queue.clone(),
            to_driver,
            self.running.clone(),
            self.config.clone(),
        ));
        self.workers
            .push(spawn_driver(from_dispatcher, self.completed.clone()));
    }

    /// Submit one request to the device queue.
    pub fn submit(&self, request: Request) -> Result<Submission, AddError> {
        self.queue.submit(request)
    }

    pub fn queue(&self) -> &Arc<DeviceQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    /// Transfers the driver has completed.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Block until every submitted request has been dispatched and completed.
    pub fn drain(&self) {
        loop {
            let snap = self.metrics.snapshot();
            if self.queue.queue_empty() && self.completed() == snap.queued {
                return;
            }
            std::thread::sleep(self.config.idle_backoff);
        }
    }

    /// Stop the threads. Pending requests stay queued; call `drain` first for
    /// a clean shutdown, then `detach`.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    /// Tear the pipeline down and detach the queue.
    ///
    /// # Panics
    /// Panics if the queue still holds pending requests (see
    /// [`DeviceQueue::detach`]).
    pub fn detach(mut self) {
        self.shutdown();
        let queue = Arc::try_unwrap(self.queue).unwrap_or_else(|_| {
            panic!("pipeline workers still hold the queue after shutdown")
        });
        queue.detach();
    }
}

fn spawn_dispatcher(
    queue: Arc<DeviceQueue>,
    to_driver: Sender<Request>,
    running: Arc<AtomicBool>,
    config: PipelineConfig,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            let mut forwarded = 0;
            while forwarded < config.dispatch_batch {
                let Some(request) = queue.dispatch() else { break };
                // Blocking send: a full channel means the device is busy,
                // and the sweep pauses with it.
                if to_driver.send(request).is_err() {
                    return;
                }
                forwarded += 1;
            }
            if forwarded == 0 {
                std::thread::sleep(config.idle_backoff);
            }
        }
    })
}

fn spawn_driver(from_dispatcher: Receiver<Request>, completed: Arc<AtomicU64>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        // Runs until the dispatcher drops its sender.
        for request in from_dispatcher.iter() {
            log::trace!("complete {request}");
            completed.fetch_add(1, Ordering::Relaxed);
        }
    })
}
