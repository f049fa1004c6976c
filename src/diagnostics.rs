//! Structured diagnostics emitted while processing documents.
//!
//! Every stage of the pipeline reports problems as [`Diagnostic`] values
//! (document, stage, severity, message). They are collected into the run
//! report and forwarded to a [`DiagnosticSink`]; the default sink writes
//! through the `log` facade so `RUST_LOG` controls what reaches the console.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Extract,
    Normalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub document: String,
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(document: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(document, stage, Severity::Info, message)
    }

    pub fn warning(document: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(document, stage, Severity::Warning, message)
    }

    pub fn error(document: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(document, stage, Severity::Error, message)
    }

    fn new(document: &str, stage: Stage, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            document: document.to_string(),
            stage,
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.document, self.message)
    }
}

/// Receives diagnostics as they are produced.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, d: &Diagnostic) {
        match d.severity {
            Severity::Info => log::info!("{}", d),
            Severity::Warning => log::warn!("{}", d),
            Severity::Error => log::error!("{}", d),
        }
    }
}

/// Keeps every diagnostic in memory. Useful for front ends that render
/// their own console.
#[derive(Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, d: &Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(d.clone());
        }
    }
}
