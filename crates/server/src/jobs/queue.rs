// crates/server/src/jobs/queue.rs
//! Unbounded FIFO queue of pending jobs.
//!
//! Many producers (HTTP handlers), one consumer (the conversion worker).
//! Neither operation blocks: the queue exposes no waiting primitive, which
//! keeps the worker loop trivially cancellable — it polls and sleeps.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::Job;

/// Concurrent FIFO of pending jobs. No priority, no deduplication: a
/// resubmission of the same input is an independent job with a fresh id.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job at the tail. Never blocks, never fails.
    pub fn enqueue(&self, job: Job) {
        self.lock().push_back(job);
    }

    /// Pop the oldest job, or `None` when the queue is empty. Never blocks.
    pub fn try_dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("job queue mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}
