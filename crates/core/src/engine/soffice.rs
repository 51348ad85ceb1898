// crates/core/src/engine/soffice.rs
//! Headless LibreOffice engine.
//!
//! Each acquisition probes the `soffice` binary and allocates a throwaway
//! user-profile directory, so concurrent or crashed instances never contend
//! on the shared profile lock. Conversions shell out with `--convert-to`;
//! LibreOffice recalculates fields and tables-of-contents while importing
//! the document headlessly, so `refresh_fields` needs no separate pass here.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::{DocumentEngine, EngineError, EngineSession};

/// Engine backed by a headless `soffice` binary.
pub struct SofficeEngine {
    binary: PathBuf,
}

impl SofficeEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl DocumentEngine for SofficeEngine {
    fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        // Probe first: a missing or wedged binary should fail acquisition,
        // not the later conversion steps.
        let probe = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                EngineError::Acquire(format!("cannot launch {}: {e}", self.binary.display()))
            })?;
        if !probe.status.success() {
            return Err(EngineError::Acquire(format!(
                "{} --version exited with {}",
                self.binary.display(),
                probe.status
            )));
        }

        let profile = tempfile::Builder::new()
            .prefix("docgate-soffice-")
            .tempdir()
            .map_err(|e| EngineError::Acquire(format!("cannot allocate profile dir: {e}")))?;

        tracing::debug!(
            binary = %self.binary.display(),
            profile = %profile.path().display(),
            "engine acquired"
        );

        Ok(Box::new(SofficeSession {
            binary: self.binary.clone(),
            profile: Some(profile),
            document: None,
        }))
    }
}

struct SofficeSession {
    binary: PathBuf,
    /// Isolated user profile; removed on close.
    profile: Option<TempDir>,
    document: Option<PathBuf>,
}

impl SofficeSession {
    fn convert_to(&self, format: &str, output: &Path) -> Result<(), EngineError> {
        let input = self
            .document
            .as_ref()
            .ok_or_else(|| EngineError::Conversion("no document open".to_string()))?;
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| EngineError::Conversion("session already closed".to_string()))?;
        let outdir = output
            .parent()
            .ok_or_else(|| EngineError::Conversion("output path has no parent".to_string()))?;
        std::fs::create_dir_all(outdir)?;

        let run = Command::new(&self.binary)
            .arg("--headless")
            .arg("--norestore")
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile.path().display()
            ))
            .arg("--convert-to")
            .arg(format)
            .arg("--outdir")
            .arg(outdir)
            .arg(input)
            .output()?;
        if !run.status.success() {
            return Err(EngineError::Conversion(format!(
                "soffice exited with {}: {}",
                run.status,
                String::from_utf8_lossy(&run.stderr).trim()
            )));
        }

        // soffice names the result after the input stem; move it onto the
        // job's output path when they differ.
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EngineError::Conversion("input has no file stem".to_string()))?;
        let produced = outdir.join(format!("{stem}.{format}"));
        if produced != output {
            std::fs::rename(&produced, output)?;
        }
        if !output.exists() {
            return Err(EngineError::Conversion(
                "soffice reported success but produced no output".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineSession for SofficeSession {
    fn open_document(&mut self, input: &Path) -> Result<(), EngineError> {
        let meta = std::fs::metadata(input).map_err(|e| {
            EngineError::Conversion(format!("cannot open {}: {e}", input.display()))
        })?;
        if !meta.is_file() {
            return Err(EngineError::Conversion(format!(
                "{} is not a regular file",
                input.display()
            )));
        }
        self.document = Some(input.to_path_buf());
        Ok(())
    }

    fn refresh_fields(&mut self) -> Result<(), EngineError> {
        // Field and TOC recalculation happens during the headless import.
        // Kept as a separate step for engines that distinguish it.
        if self.document.is_none() {
            return Err(EngineError::Conversion("no document open".to_string()));
        }
        Ok(())
    }

    fn save_docx(&mut self, output: &Path) -> Result<(), EngineError> {
        self.convert_to("docx", output)
    }

    fn export_pdf(&mut self, output: &Path) -> Result<(), EngineError> {
        self.convert_to("pdf", output)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.document = None;
        if let Some(profile) = self.profile.take() {
            profile.close()?;
        }
        Ok(())
    }
}
