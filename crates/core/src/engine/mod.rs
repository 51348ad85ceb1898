// crates/core/src/engine/mod.rs
//! Conversion engine abstraction.
//!
//! The service core never talks to a converter directly; it goes through
//! these traits so the worker can be exercised against instrumented fakes.
//! The contract mirrors the underlying engine's constraints:
//!
//! - `DocumentEngine::acquire` may fail transiently (a prior instance not yet
//!   torn down); the worker retries acquisition with a bounded backoff.
//! - At most one live `EngineSession` at a time. The engine is not safely
//!   reentrant; serialization is enforced by the single conversion worker.
//! - Every acquired session must be closed on every exit path. A leaked
//!   session poisons subsequent acquisitions.
//!
//! Session calls are blocking; the worker drives them from a blocking task.

pub mod soffice;

use std::path::Path;

use thiserror::Error;

pub use soffice::SofficeEngine;

/// Errors surfaced by an engine or one of its sessions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine instance could not be brought up. Often transient.
    #[error("engine acquisition failed: {0}")]
    Acquire(String),

    /// Filesystem-level failure while driving the engine.
    #[error("engine io error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine ran but the document operation failed.
    #[error("conversion failed: {0}")]
    Conversion(String),
}

/// Factory for conversion sessions.
pub trait DocumentEngine: Send + Sync {
    /// Bring up a fresh engine instance and return a session bound to it.
    fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One acquired engine instance driving one document at a time.
pub trait EngineSession: Send {
    /// Open the source document.
    fn open_document(&mut self, input: &Path) -> Result<(), EngineError>;

    /// Update computed fields and tables-of-contents, in document order.
    fn refresh_fields(&mut self) -> Result<(), EngineError>;

    /// Save a normalized copy in docx format.
    fn save_docx(&mut self, output: &Path) -> Result<(), EngineError>;

    /// Export a fixed-format (PDF) rendition.
    fn export_pdf(&mut self, output: &Path) -> Result<(), EngineError>;

    /// Release the engine instance. Must be called on every path; callers
    /// log close failures rather than letting them mask an earlier error.
    fn close(&mut self) -> Result<(), EngineError>;
}
