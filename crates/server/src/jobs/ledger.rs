// crates/server/src/jobs/ledger.rs
//! Authoritative store of job status and results.
//!
//! Single writer for transitions (the worker, plus the gateway inserting the
//! initial `queued` entry), many concurrent readers (HTTP handlers). No
//! operation blocks beyond one map access. Entries stay for the lifetime of
//! the process unless TTL eviction is configured.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::types::{ArtifactMap, JobResult, JobStatus};

#[derive(Debug, Clone)]
struct LedgerEntry {
    status: JobStatus,
    result: Option<JobResult>,
    terminal_at: Option<Instant>,
}

/// Concurrent status/result ledger keyed by job id.
#[derive(Default)]
pub struct JobLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly submitted job as `queued`.
    pub fn insert_queued(&self, id: &str) {
        self.write(|entries| {
            entries.insert(
                id.to_string(),
                LedgerEntry {
                    status: JobStatus::Queued,
                    result: None,
                    terminal_at: None,
                },
            );
        });
    }

    /// Transition a job to `running`. A missing entry is logged and ignored;
    /// it can only mean the entry was evicted between dequeue and here.
    pub fn set_running(&self, id: &str) {
        self.write(|entries| match entries.get_mut(id) {
            Some(entry) if !entry.status.is_terminal() => entry.status = JobStatus::Running,
            Some(_) => tracing::warn!(job_id = %id, "ignoring running transition on terminal job"),
            None => tracing::warn!(job_id = %id, "running transition for unknown job"),
        });
    }

    /// Terminal success: status `completed` plus the artifact map, written
    /// together. Write-once: a second terminal write is ignored.
    pub fn complete(&self, id: &str, artifacts: ArtifactMap) {
        self.finish(id, JobStatus::Completed, JobResult::Artifacts(artifacts));
    }

    /// Terminal failure: status `failed` plus the error description.
    pub fn fail(&self, id: &str, error: impl Into<String>) {
        self.finish(
            id,
            JobStatus::Failed,
            JobResult::Error {
                error: error.into(),
            },
        );
    }

    fn finish(&self, id: &str, status: JobStatus, result: JobResult) {
        self.write(|entries| match entries.get_mut(id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = status;
                entry.result = Some(result);
                entry.terminal_at = Some(Instant::now());
            }
            Some(_) => tracing::warn!(job_id = %id, "ignoring duplicate terminal transition"),
            None => tracing::warn!(job_id = %id, "terminal transition for unknown job"),
        });
    }

    /// Current status, or `None` for an id never written.
    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.read(|entries| entries.get(id).map(|e| e.status))
    }

    /// Status and result-if-present in one consistent read.
    pub fn snapshot(&self, id: &str) -> Option<(JobStatus, Option<JobResult>)> {
        self.read(|entries| entries.get(id).map(|e| (e.status, e.result.clone())))
    }

    /// Evict terminal entries older than `ttl`. Returns the eviction count.
    pub fn prune_terminal(&self, ttl: Duration) -> usize {
        self.write(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| match entry.terminal_at {
                Some(at) => at.elapsed() < ttl,
                None => true,
            });
            before - entries.len()
        })
    }

    pub fn len(&self) -> usize {
        self.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<String, LedgerEntry>) -> T) -> T {
        match self.entries.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => {
                tracing::error!("job ledger rwlock poisoned; recovering");
                f(&poisoned.into_inner())
            }
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut HashMap<String, LedgerEntry>) -> T) -> T {
        match self.entries.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => {
                tracing::error!("job ledger rwlock poisoned; recovering");
                f(&mut poisoned.into_inner())
            }
        }
    }
}
