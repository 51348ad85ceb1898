// crates/server/src/jobs/worker.rs
//! Single conversion worker.
//!
//! One long-lived task drains the queue strictly sequentially — the engine
//! cannot run multiple instances reliably, so at most one conversion is ever
//! in flight. Engine *acquisition* is retried with a bounded backoff;
//! document processing never is. A job failure never stops the loop; only
//! cancellation does.

use std::sync::Arc;
use std::time::Duration;

use docgate_core::engine::{DocumentEngine, EngineError, EngineSession};
use docgate_core::storage::artifact_href;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ledger::JobLedger;
use super::queue::JobQueue;
use super::types::{ArtifactKind, ArtifactMap, Job};

/// Job-level failures surfaced through the ledger, never as HTTP errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("engine acquisition failed after {attempts} attempts: {last}")]
    Acquire { attempts: u32, last: EngineError },

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("conversion timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Tuning knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Pause after every job, success or failure, so the engine's OS-level
    /// resources settle before the next acquisition. Pacing, not an
    /// optimization.
    pub settle_delay: Duration,
    /// Bounded engine-acquisition retry.
    pub acquire_attempts: u32,
    /// Fixed backoff between acquisition attempts.
    pub acquire_backoff: Duration,
    /// Wall-clock bound per conversion; `None` disables it.
    pub conversion_timeout: Option<Duration>,
    /// When set, terminal ledger entries older than this are evicted after
    /// each job.
    pub ledger_ttl: Option<Duration>,
    /// Refresh fields and tables-of-contents before saving.
    pub refresh_enabled: bool,
    /// Export the PDF rendition.
    pub pdf_enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            settle_delay: Duration::from_millis(250),
            acquire_attempts: 3,
            acquire_backoff: Duration::from_secs(1),
            conversion_timeout: None,
            ledger_ttl: None,
            refresh_enabled: true,
            pdf_enabled: true,
        }
    }
}

/// The single conversion worker. Owns the consumer side of the queue.
pub struct ConversionWorker {
    queue: Arc<JobQueue>,
    ledger: Arc<JobLedger>,
    engine: Arc<dyn DocumentEngine>,
    config: WorkerConfig,
}

impl ConversionWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        ledger: Arc<JobLedger>,
        engine: Arc<dyn DocumentEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            ledger,
            engine,
            config,
        }
    }

    /// Spawn the worker loop. It runs until `shutdown` fires; an in-flight
    /// conversion finishes (or times out) first, a new one is never started.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        tracing::info!("conversion worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let Some(job) = self.queue.try_dequeue() else {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            };

            self.process(job).await;

            if let Some(ttl) = self.config.ledger_ttl {
                let evicted = self.ledger.prune_terminal(ttl);
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted terminal ledger entries");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.settle_delay) => {}
            }
        }
        tracing::info!("conversion worker stopped");
    }

    async fn process(&self, job: Job) {
        self.ledger.set_running(&job.id);
        tracing::info!(
            job_id = %job.id,
            input = %job.input_path.display(),
            original = %job.original_name,
            "job started"
        );

        let engine = Arc::clone(&self.engine);
        let options = ConvertOptions {
            refresh: self.config.refresh_enabled,
            pdf: self.config.pdf_enabled,
            acquire_attempts: self.config.acquire_attempts,
            acquire_backoff: self.config.acquire_backoff,
        };
        let blocking_job = job.clone();
        let task =
            tokio::task::spawn_blocking(move || convert_document(&*engine, &blocking_job, &options));

        let outcome = match self.config.conversion_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    // The blocking task cannot be interrupted; it is left to
                    // finish detached and its result is discarded. The next
                    // acquisition's retry absorbs any engine contention it
                    // leaves behind.
                    tracing::warn!(job_id = %job.id, limit_secs = limit.as_secs(), "conversion timed out, abandoning task");
                    Err(WorkerError::Timeout {
                        secs: limit.as_secs(),
                    })
                }
            },
            None => flatten(task.await),
        };

        match outcome {
            Ok(artifacts) => {
                self.ledger.complete(&job.id, artifacts);
                tracing::info!(job_id = %job.id, "job completed");
            }
            Err(e) => {
                self.ledger.fail(&job.id, e.to_string());
                tracing::warn!(job_id = %job.id, error = %e, "job failed");
            }
        }
    }
}

fn flatten(
    joined: Result<Result<ArtifactMap, WorkerError>, tokio::task::JoinError>,
) -> Result<ArtifactMap, WorkerError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => Err(WorkerError::Conversion(format!(
            "conversion task panicked: {e}"
        ))),
    }
}

struct ConvertOptions {
    refresh: bool,
    pdf: bool,
    acquire_attempts: u32,
    acquire_backoff: Duration,
}

/// Drive one job through the engine. Blocking; runs on the blocking pool.
///
/// The session is closed on every path. A close failure is logged and
/// swallowed so it never masks the conversion outcome.
fn convert_document(
    engine: &dyn DocumentEngine,
    job: &Job,
    options: &ConvertOptions,
) -> Result<ArtifactMap, WorkerError> {
    if let Some(parent) = job.docx_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| WorkerError::Conversion(format!("cannot create output dir: {e}")))?;
    }

    let mut session = acquire_with_retry(engine, options.acquire_attempts, options.acquire_backoff)?;
    let outcome = run_steps(session.as_mut(), job, options);
    if let Err(e) = session.close() {
        tracing::warn!(job_id = %job.id, error = %e, "engine session close failed");
    }
    outcome
}

fn acquire_with_retry(
    engine: &dyn DocumentEngine,
    attempts: u32,
    backoff: Duration,
) -> Result<Box<dyn EngineSession>, WorkerError> {
    let attempts = attempts.max(1);
    let mut last = EngineError::Acquire("no attempts made".to_string());
    for attempt in 1..=attempts {
        match engine.acquire() {
            Ok(session) => return Ok(session),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "engine acquisition failed");
                last = e;
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    Err(WorkerError::Acquire { attempts, last })
}

fn run_steps(
    session: &mut dyn EngineSession,
    job: &Job,
    options: &ConvertOptions,
) -> Result<ArtifactMap, WorkerError> {
    let conv = |e: EngineError| WorkerError::Conversion(e.to_string());

    session.open_document(&job.input_path).map_err(conv)?;
    if options.refresh {
        session.refresh_fields().map_err(conv)?;
    }
    session.save_docx(&job.docx_path).map_err(conv)?;

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        ArtifactKind::Docx,
        artifact_href(&job.partition, &format!("{}.docx", job.id)),
    );

    if options.pdf {
        if let Some(pdf_path) = &job.pdf_path {
            session.export_pdf(pdf_path).map_err(conv)?;
            artifacts.insert(
                ArtifactKind::Pdf,
                artifact_href(&job.partition, &format!("{}.pdf", job.id)),
            );
        }
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{
        CloseTrackingEngine, CopyEngine, FailOpenEngine, FlakyEngine, NeverAcquireEngine,
        ReentrancyProbeEngine, SlowEngine,
    };
    use crate::jobs::types::JobStatus;
    use docgate_core::storage::PartitionKey;
    use std::path::Path;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(1),
            acquire_backoff: Duration::from_millis(5),
            ..WorkerConfig::default()
        }
    }

    fn make_job(dir: &Path, id: &str, content: &[u8]) -> Job {
        let key = PartitionKey::today();
        let input = dir.join(format!("{id}-input.docx"));
        std::fs::write(&input, content).unwrap();
        let out_dir = dir.join("outputs").join(&key.year).join(&key.day);
        Job {
            id: id.to_string(),
            input_path: input,
            docx_path: out_dir.join(format!("{id}.docx")),
            pdf_path: Some(out_dir.join(format!("{id}.pdf"))),
            partition: key,
            original_name: format!("{id}-input.docx"),
        }
    }

    async fn wait_terminal(ledger: &JobLedger, id: &str) -> JobStatus {
        for _ in 0..500 {
            if let Some(status) = ledger.status(id) {
                if status.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached a terminal status");
    }

    fn setup(
        engine: Arc<dyn DocumentEngine>,
        config: WorkerConfig,
    ) -> (Arc<JobQueue>, Arc<JobLedger>, CancellationToken) {
        let queue = Arc::new(JobQueue::new());
        let ledger = Arc::new(JobLedger::new());
        let token = CancellationToken::new();
        ConversionWorker::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            engine,
            config,
        )
        .spawn(token.clone());
        (queue, ledger, token)
    }

    #[tokio::test]
    async fn test_successful_conversion_produces_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, ledger, token) = setup(Arc::new(CopyEngine), fast_config());

        let job = make_job(dir.path(), "job-ok", b"document body");
        let docx_path = job.docx_path.clone();
        let pdf_path = job.pdf_path.clone().unwrap();
        ledger.insert_queued(&job.id);
        queue.enqueue(job);

        assert_eq!(wait_terminal(&ledger, "job-ok").await, JobStatus::Completed);
        let (_, result) = ledger.snapshot("job-ok").unwrap();
        match result.unwrap() {
            crate::jobs::types::JobResult::Artifacts(map) => {
                assert!(map[&ArtifactKind::Docx].starts_with("/files/"));
                assert!(map[&ArtifactKind::Docx].ends_with("job-ok.docx"));
                assert!(map[&ArtifactKind::Pdf].ends_with("job-ok.pdf"));
            }
            other => panic!("expected artifacts, got {other:?}"),
        }
        assert_eq!(std::fs::read(docx_path).unwrap(), b"document body");
        assert!(pdf_path.exists());
        token.cancel();
    }

    #[tokio::test]
    async fn test_pdf_disabled_skips_export() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            pdf_enabled: false,
            ..fast_config()
        };
        let (queue, ledger, token) = setup(Arc::new(CopyEngine), config);

        let job = make_job(dir.path(), "job-nopdf", b"x");
        let pdf_path = job.pdf_path.clone().unwrap();
        ledger.insert_queued(&job.id);
        queue.enqueue(job);

        assert_eq!(wait_terminal(&ledger, "job-nopdf").await, JobStatus::Completed);
        let (_, result) = ledger.snapshot("job-nopdf").unwrap();
        match result.unwrap() {
            crate::jobs::types::JobResult::Artifacts(map) => {
                assert!(map.contains_key(&ArtifactKind::Docx));
                assert!(!map.contains_key(&ArtifactKind::Pdf));
            }
            other => panic!("expected artifacts, got {other:?}"),
        }
        assert!(!pdf_path.exists());
        token.cancel();
    }

    #[tokio::test]
    async fn test_acquisition_retry_succeeds_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FlakyEngine::failing_first(2));
        let (queue, ledger, token) = setup(engine.clone(), fast_config());

        let job = make_job(dir.path(), "job-flaky", b"retry me");
        ledger.insert_queued(&job.id);
        queue.enqueue(job);

        assert_eq!(wait_terminal(&ledger, "job-flaky").await, JobStatus::Completed);
        assert_eq!(engine.attempts(), 3);
        token.cancel();
    }

    #[tokio::test]
    async fn test_acquisition_exhaustion_fails_job_not_worker() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(NeverAcquireEngine::default());
        let (queue, ledger, token) = setup(engine.clone(), fast_config());

        let doomed = make_job(dir.path(), "job-doomed", b"a");
        ledger.insert_queued(&doomed.id);
        queue.enqueue(doomed);

        assert_eq!(wait_terminal(&ledger, "job-doomed").await, JobStatus::Failed);
        assert_eq!(engine.attempts(), 3);
        let (_, result) = ledger.snapshot("job-doomed").unwrap();
        match result.unwrap() {
            crate::jobs::types::JobResult::Error { error } => {
                assert!(error.contains("after 3 attempts"), "message was: {error}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        token.cancel();
    }

    #[tokio::test]
    async fn test_processing_failure_still_closes_session_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CloseTrackingEngine::wrapping(FailOpenEngine));
        let (queue, ledger, token) = setup(engine.clone(), fast_config());

        let bad = make_job(dir.path(), "job-bad", b"a");
        let good = make_job(dir.path(), "job-good", b"b");
        ledger.insert_queued(&bad.id);
        ledger.insert_queued(&good.id);
        queue.enqueue(bad);
        queue.enqueue(good);

        assert_eq!(wait_terminal(&ledger, "job-bad").await, JobStatus::Failed);
        // The worker survives the failure and picks up the next job.
        assert_eq!(wait_terminal(&ledger, "job-good").await, JobStatus::Failed);
        assert_eq!(engine.sessions_opened(), engine.sessions_closed());
        assert_eq!(engine.sessions_closed(), 2);
        token.cancel();
    }

    #[tokio::test]
    async fn test_at_most_one_conversion_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ReentrancyProbeEngine::default());
        let (queue, ledger, token) = setup(engine.clone(), fast_config());

        for i in 0..5 {
            let job = make_job(dir.path(), &format!("job-{i}"), b"payload");
            ledger.insert_queued(&job.id);
            queue.enqueue(job);
        }
        for i in 0..5 {
            assert_eq!(
                wait_terminal(&ledger, &format!("job-{i}")).await,
                JobStatus::Completed
            );
        }
        assert!(!engine.violated(), "observed overlapping engine sessions");
        token.cancel();
    }

    #[tokio::test]
    async fn test_conversion_timeout_force_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            conversion_timeout: Some(Duration::from_millis(50)),
            ..fast_config()
        };
        let (queue, ledger, token) = setup(
            Arc::new(SlowEngine::taking(Duration::from_secs(5))),
            config,
        );

        let job = make_job(dir.path(), "job-slow", b"z");
        ledger.insert_queued(&job.id);
        queue.enqueue(job);

        assert_eq!(wait_terminal(&ledger, "job-slow").await, JobStatus::Failed);
        let (_, result) = ledger.snapshot("job-slow").unwrap();
        match result.unwrap() {
            crate::jobs::types::JobResult::Error { error } => {
                assert!(error.contains("timed out"), "message was: {error}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        token.cancel();
    }

    #[tokio::test]
    async fn test_ledger_ttl_evicts_after_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            ledger_ttl: Some(Duration::ZERO),
            ..fast_config()
        };
        let (queue, ledger, token) = setup(Arc::new(CopyEngine), config);

        let job = make_job(dir.path(), "job-ttl", b"v");
        ledger.insert_queued(&job.id);
        queue.enqueue(job);

        // With a zero TTL the terminal entry is gone right after processing.
        for _ in 0..500 {
            if ledger.status("job-ttl").is_none() {
                token.cancel();
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("terminal entry was never evicted");
    }

    #[tokio::test]
    async fn test_cancellation_stops_idle_worker() {
        let queue = Arc::new(JobQueue::new());
        let ledger = Arc::new(JobLedger::new());
        let token = CancellationToken::new();
        let handle = ConversionWorker::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            Arc::new(CopyEngine),
            fast_config(),
        )
        .spawn(token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop after cancellation")
            .unwrap();
    }
}
