//! Pending-request FIFO drained in fixed-size batches.
//!
//! The queue is unbounded and applies no backpressure. A drain tick takes at
//! most `batch_size` requests and processes them one after another; a failing
//! item never aborts its siblings. Ticks are not re-entrant: a tick started
//! while another is still in flight returns [`DrainOutcome::Skipped`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DispatchError, TransmissionRequest, TransmissionResult};

/// Default number of requests processed per drain tick.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Retry policy for the interactive send path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the single retry.
    pub delay: Duration,
    /// Number of retries after the first failure.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// One retry after `delay`.
    pub fn once_after(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: 1,
        }
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn allows(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once_after(Duration::from_secs(5))
    }
}

/// Result of one drain tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A previous tick was still running; nothing was taken.
    Skipped,
    /// The batch was processed.
    Processed {
        /// Requests taken from the queue.
        taken: usize,
        /// Requests delivered.
        delivered: usize,
        /// Requests that came back as failed results.
        failed: usize,
        /// Requests whose processing returned an error.
        errored: usize,
    },
}

/// Unbounded FIFO of pending transmission requests.
#[derive(Debug)]
pub struct DispatchQueue {
    pending: Mutex<VecDeque<TransmissionRequest>>,
    in_flight: AtomicBool,
    batch_size: usize,
}

/// Clears the in-flight flag when a tick ends, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DispatchQueue {
    /// Empty queue with the given batch size (zero is treated as one).
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: AtomicBool::new(false),
            batch_size: batch_size.max(1),
        }
    }

    /// Maximum requests taken per tick.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append a request to the back of the queue.
    pub async fn enqueue(&self, request: TransmissionRequest) {
        let mut pending = self.pending.lock().await;
        pending.push_back(request);
        debug!(depth = pending.len(), "request queued");
    }

    /// Append several requests, preserving order.
    pub async fn enqueue_all(&self, requests: impl IntoIterator<Item = TransmissionRequest>) {
        let mut pending = self.pending.lock().await;
        pending.extend(requests);
        debug!(depth = pending.len(), "requests queued");
    }

    /// Number of pending requests.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Whether a drain tick is currently running.
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Remove up to one batch from the front of the queue.
    async fn take_batch(&self) -> Vec<TransmissionRequest> {
        let mut pending = self.pending.lock().await;
        let count = pending.len().min(self.batch_size);
        pending.drain(..count).collect()
    }

    /// Run one drain tick, feeding each taken request to `process` in order.
    ///
    /// The queue lock is not held while `process` runs, so producers can keep
    /// enqueueing during a tick.
    pub async fn drain_tick<F, Fut>(&self, mut process: F) -> DrainOutcome
    where
        F: FnMut(TransmissionRequest) -> Fut,
        Fut: Future<Output = Result<TransmissionResult, DispatchError>>,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain tick skipped: previous tick still in flight");
            return DrainOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let batch = self.take_batch().await;
        let taken = batch.len();
        let mut delivered = 0usize;
        let mut failed = 0usize;
        let mut errored = 0usize;

        for request in batch {
            let id = request.id.clone();
            match process(request).await {
                Ok(result) if result.success => delivered = delivered.saturating_add(1),
                Ok(result) => {
                    debug!(id = %id, error = ?result.error, "queued transmission failed");
                    failed = failed.saturating_add(1);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "queued request errored");
                    errored = errored.saturating_add(1);
                }
            }
        }

        DrainOutcome::Processed {
            taken,
            delivered,
            failed,
            errored,
        }
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
