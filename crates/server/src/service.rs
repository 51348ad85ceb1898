// crates/server/src/service.rs
//! Service lifecycle.
//!
//! Owns everything with a lifetime: the listener, the HTTP server task and
//! the conversion worker. `start` brings the service from `Stopped` to
//! `Running`; `stop` signals shutdown and waits a bounded grace period for
//! the worker to finish an in-flight job.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Days, Local};
use docgate_core::{sweep_partitions, DocumentEngine, ServiceConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::create_app;
use crate::jobs::{ConversionWorker, WorkerConfig};
use crate::state::AppState;

/// How long `stop` waits for the worker before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle phases. Transitions only move forward within one
/// start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServicePhase {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ServicePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// The assembled service: storage, worker, HTTP gateway.
pub struct Service {
    config: ServiceConfig,
    engine: Arc<dyn DocumentEngine>,
    phase: AtomicU8,
    state: Option<Arc<AppState>>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    local_addr: Option<SocketAddr>,
}

impl Service {
    pub fn new(config: ServiceConfig, engine: Arc<dyn DocumentEngine>) -> Self {
        Self {
            config,
            engine,
            phase: AtomicU8::new(ServicePhase::Stopped as u8),
            state: None,
            shutdown: CancellationToken::new(),
            worker: None,
            server: None,
            local_addr: None,
        }
    }

    pub fn phase(&self) -> ServicePhase {
        ServicePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// The bound address, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Shared state, once running. Used by tests to inspect the ledger.
    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.state.as_ref()
    }

    /// Bring the service up: prepare storage, run the retention sweep, bind
    /// the listener, start the worker and the HTTP server.
    ///
    /// A failed start leaves nothing running and returns the machine to
    /// `Stopped`, so `start` can be retried on the same object.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if self.phase() != ServicePhase::Stopped {
            anyhow::bail!("service is already started");
        }
        self.phase
            .store(ServicePhase::Starting as u8, Ordering::SeqCst);

        match self.bring_up().await {
            Ok(addr) => {
                self.phase
                    .store(ServicePhase::Running as u8, Ordering::SeqCst);
                tracing::info!(addr = %addr, "service running");
                Ok(addr)
            }
            Err(e) => {
                self.phase
                    .store(ServicePhase::Stopped as u8, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// The fallible part of startup. Everything here runs before any task is
    /// spawned or after the last fallible step, so an error leaves no
    /// background work behind.
    async fn bring_up(&mut self) -> anyhow::Result<SocketAddr> {
        let upload_root = self.config.upload_root();
        let output_root = self.config.output_root();
        tokio::fs::create_dir_all(&upload_root)
            .await
            .with_context(|| format!("cannot create upload root {}", upload_root.display()))?;
        tokio::fs::create_dir_all(&output_root)
            .await
            .with_context(|| format!("cannot create output root {}", output_root.display()))?;

        self.run_retention_sweep(&upload_root, &output_root);

        let state = AppState::new(self.config.clone());
        let app = create_app(Arc::clone(&state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind {addr}"))?;
        let local_addr = listener.local_addr().context("cannot read bound address")?;

        self.shutdown = CancellationToken::new();
        let worker = ConversionWorker::new(
            Arc::clone(&state.queue),
            Arc::clone(&state.ledger),
            Arc::clone(&self.engine),
            worker_config(&self.config),
        );
        self.worker = Some(worker.spawn(self.shutdown.clone()));

        let server_shutdown = self.shutdown.clone();
        self.server = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
        }));

        self.state = Some(state);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Startup-only sweep of expired partitions, gated per root by the
    /// auto-delete flags. Best effort; failures are logged and startup
    /// continues.
    fn run_retention_sweep(&self, upload_root: &std::path::Path, output_root: &std::path::Path) {
        if !self.config.auto_delete_uploads && !self.config.auto_delete_outputs {
            return;
        }
        let today = Local::now().date_naive();
        let Some(horizon) = today.checked_sub_days(Days::new(self.config.retention_days as u64))
        else {
            tracing::warn!(
                retention_days = self.config.retention_days,
                "retention horizon underflowed, skipping sweep"
            );
            return;
        };

        for (flag, root) in [
            (self.config.auto_delete_uploads, upload_root),
            (self.config.auto_delete_outputs, output_root),
        ] {
            if !flag {
                continue;
            }
            let stats = sweep_partitions(root, horizon);
            tracing::info!(
                root = %root.display(),
                partitions_removed = stats.partitions_removed,
                years_removed = stats.years_removed,
                errors = stats.errors,
                "retention sweep finished"
            );
        }
    }

    /// Bring the service down. The HTTP server stops accepting requests and
    /// the worker gets `SHUTDOWN_GRACE` to finish an in-flight conversion;
    /// past that it is abandoned.
    pub async fn stop(&mut self) {
        if self.phase() != ServicePhase::Running {
            return;
        }
        self.phase
            .store(ServicePhase::Stopping as u8, Ordering::SeqCst);
        tracing::info!("stopping service");
        self.shutdown.cancel();

        if let Some(worker) = self.worker.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "worker task panicked"),
                Err(_) => tracing::warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "worker did not stop within the grace period, abandoning"
                ),
            }
        }
        if let Some(server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "server exited with error"),
                Ok(Err(e)) => tracing::error!(error = %e, "server task panicked"),
                Err(_) => tracing::warn!("server did not stop within the grace period"),
            }
        }

        self.state = None;
        self.local_addr = None;
        self.phase
            .store(ServicePhase::Stopped as u8, Ordering::SeqCst);
        tracing::info!("service stopped");
    }
}

/// Derive the worker tuning from the service configuration.
fn worker_config(config: &ServiceConfig) -> WorkerConfig {
    WorkerConfig {
        conversion_timeout: config.conversion_timeout,
        ledger_ttl: config.ledger_ttl,
        refresh_enabled: config.enable_refresh,
        pdf_enabled: config.enable_pdf,
        ..WorkerConfig::default()
    }
}
