// crates/server/src/jobs/mod.rs
//! Conversion job subsystem.
//!
//! Provides:
//! - `JobQueue` — unbounded FIFO, many producers / single consumer
//! - `JobLedger` — concurrent status/result store
//! - `ConversionWorker` — the single sequential processing loop
//! - job and result types shared with the HTTP layer

pub mod ledger;
pub mod queue;
pub mod types;
pub mod worker;

pub use ledger::JobLedger;
pub use queue::JobQueue;
pub use types::{ArtifactKind, ArtifactMap, Job, JobId, JobResult, JobStatus};
pub use worker::{ConversionWorker, WorkerConfig, WorkerError};

/// Instrumented engine fakes shared by worker and router tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use docgate_core::engine::{DocumentEngine, EngineError, EngineSession};

    /// Succeeds by copying the input: the docx output is a byte-for-byte
    /// copy, the pdf output gets a `%PDF` header prepended.
    pub struct CopyEngine;

    impl DocumentEngine for CopyEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            Ok(Box::new(CopySession { document: None }))
        }
    }

    struct CopySession {
        document: Option<PathBuf>,
    }

    impl CopySession {
        fn input(&self) -> Result<&Path, EngineError> {
            self.document
                .as_deref()
                .ok_or_else(|| EngineError::Conversion("no document open".to_string()))
        }
    }

    impl EngineSession for CopySession {
        fn open_document(&mut self, input: &Path) -> Result<(), EngineError> {
            if !input.is_file() {
                return Err(EngineError::Conversion(format!(
                    "cannot open {}",
                    input.display()
                )));
            }
            self.document = Some(input.to_path_buf());
            Ok(())
        }

        fn refresh_fields(&mut self) -> Result<(), EngineError> {
            self.input().map(|_| ())
        }

        fn save_docx(&mut self, output: &Path) -> Result<(), EngineError> {
            std::fs::copy(self.input()?, output)?;
            Ok(())
        }

        fn export_pdf(&mut self, output: &Path) -> Result<(), EngineError> {
            let content = std::fs::read(self.input()?)?;
            let mut rendition = b"%PDF-1.4\n".to_vec();
            rendition.extend_from_slice(&content);
            std::fs::write(output, rendition)?;
            Ok(())
        }

        fn close(&mut self) -> Result<(), EngineError> {
            self.document = None;
            Ok(())
        }
    }

    /// Fails the first `n` acquisitions, then behaves like `CopyEngine`.
    pub struct FlakyEngine {
        failures_left: AtomicU32,
        attempts: AtomicU32,
    }

    impl FlakyEngine {
        pub fn failing_first(n: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(n),
                attempts: AtomicU32::new(0),
            }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl DocumentEngine for FlakyEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(EngineError::Acquire(
                    "previous instance still tearing down".to_string(),
                ));
            }
            CopyEngine.acquire()
        }
    }

    /// Every acquisition fails.
    #[derive(Default)]
    pub struct NeverAcquireEngine {
        attempts: AtomicU32,
    }

    impl NeverAcquireEngine {
        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl DocumentEngine for NeverAcquireEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Acquire("engine unavailable".to_string()))
        }
    }

    /// Sessions open fine but every document open fails.
    pub struct FailOpenEngine;

    impl DocumentEngine for FailOpenEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            Ok(Box::new(FailOpenSession))
        }
    }

    struct FailOpenSession;

    impl EngineSession for FailOpenSession {
        fn open_document(&mut self, _input: &Path) -> Result<(), EngineError> {
            Err(EngineError::Conversion("corrupt document".to_string()))
        }
        fn refresh_fields(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn save_docx(&mut self, _output: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        fn export_pdf(&mut self, _output: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    /// Wraps another engine and counts session opens/closes, to assert the
    /// release-on-every-path invariant.
    pub struct CloseTrackingEngine<E> {
        inner: E,
        opened: Arc<AtomicU32>,
        closed: Arc<AtomicU32>,
    }

    impl<E> CloseTrackingEngine<E> {
        pub fn wrapping(inner: E) -> Self {
            Self {
                inner,
                opened: Arc::new(AtomicU32::new(0)),
                closed: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn sessions_opened(&self) -> u32 {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn sessions_closed(&self) -> u32 {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl<E: DocumentEngine> DocumentEngine for CloseTrackingEngine<E> {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            let session = self.inner.acquire()?;
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CloseTrackingSession {
                inner: session,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    struct CloseTrackingSession {
        inner: Box<dyn EngineSession>,
        closed: Arc<AtomicU32>,
    }

    impl EngineSession for CloseTrackingSession {
        fn open_document(&mut self, input: &Path) -> Result<(), EngineError> {
            self.inner.open_document(input)
        }
        fn refresh_fields(&mut self) -> Result<(), EngineError> {
            self.inner.refresh_fields()
        }
        fn save_docx(&mut self, output: &Path) -> Result<(), EngineError> {
            self.inner.save_docx(output)
        }
        fn export_pdf(&mut self, output: &Path) -> Result<(), EngineError> {
            self.inner.export_pdf(output)
        }
        fn close(&mut self) -> Result<(), EngineError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.close()
        }
    }

    /// Asserts the engine is never entered reentrantly: acquiring while a
    /// session is live records a violation.
    #[derive(Default)]
    pub struct ReentrancyProbeEngine {
        in_flight: Arc<AtomicBool>,
        violated: Arc<AtomicBool>,
    }

    impl ReentrancyProbeEngine {
        pub fn violated(&self) -> bool {
            self.violated.load(Ordering::SeqCst)
        }
    }

    impl DocumentEngine for ReentrancyProbeEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.violated.store(true, Ordering::SeqCst);
            }
            let inner = CopyEngine.acquire()?;
            Ok(Box::new(ProbeSession {
                inner,
                in_flight: Arc::clone(&self.in_flight),
            }))
        }
    }

    struct ProbeSession {
        inner: Box<dyn EngineSession>,
        in_flight: Arc<AtomicBool>,
    }

    impl EngineSession for ProbeSession {
        fn open_document(&mut self, input: &Path) -> Result<(), EngineError> {
            self.inner.open_document(input)
        }
        fn refresh_fields(&mut self) -> Result<(), EngineError> {
            self.inner.refresh_fields()
        }
        fn save_docx(&mut self, output: &Path) -> Result<(), EngineError> {
            self.inner.save_docx(output)
        }
        fn export_pdf(&mut self, output: &Path) -> Result<(), EngineError> {
            self.inner.export_pdf(output)
        }
        fn close(&mut self) -> Result<(), EngineError> {
            self.in_flight.store(false, Ordering::SeqCst);
            self.inner.close()
        }
    }

    /// Acquisition succeeds but the save step blocks for a fixed duration.
    pub struct SlowEngine {
        delay: Duration,
    }

    impl SlowEngine {
        pub fn taking(delay: Duration) -> Self {
            Self { delay }
        }
    }

    impl DocumentEngine for SlowEngine {
        fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
            Ok(Box::new(SlowSession { delay: self.delay }))
        }
    }

    struct SlowSession {
        delay: Duration,
    }

    impl EngineSession for SlowSession {
        fn open_document(&mut self, _input: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        fn refresh_fields(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn save_docx(&mut self, _output: &Path) -> Result<(), EngineError> {
            std::thread::sleep(self.delay);
            Ok(())
        }
        fn export_pdf(&mut self, _output: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }
}
