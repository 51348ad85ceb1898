// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use docgate_core::{ServiceConfig, StorageLayout};

use crate::jobs::{JobLedger, JobQueue};

/// Shared application state accessible from all route handlers.
///
/// The queue and ledger are the only mutable state shared between the HTTP
/// handlers and the conversion worker; both are internally synchronized for
/// exactly that access pattern.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Configuration for this run.
    pub config: ServiceConfig,
    /// Resolved upload/output roots and path allocation.
    pub layout: StorageLayout,
    /// Pending jobs. Producers: handlers; consumer: the worker.
    pub queue: Arc<JobQueue>,
    /// Job status and results. Writer: the worker; readers: handlers.
    pub ledger: Arc<JobLedger>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(config: ServiceConfig) -> Arc<Self> {
        let layout = StorageLayout::new(config.upload_root(), config.output_root());
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            layout,
            queue: Arc::new(JobQueue::new()),
            ledger: Arc::new(JobLedger::new()),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
