//! Run progress reporting.
//!
//! Reports observable progress during `harvest run` so users see which
//! document was just processed and how many are left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// The directory scan finished; `total` documents will be processed.
    Scanned { total: u64 },
    /// One document finished, successfully or not.
    DocumentDone {
        name: String,
        ok: bool,
        message: Option<String>,
        n: u64,
        total: u64,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline after each document.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "[  3 / 120] ok      A Draft Report.pdf".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Scanned { total } => {
                format!("harvest  found {} documents\n", format_number(*total))
            }
            ProgressEvent::DocumentDone {
                name,
                ok,
                message,
                n,
                total,
            } => {
                let status = if *ok { "ok" } else { "skipped" };
                let width = total.to_string().len();
                match message {
                    Some(msg) => format!(
                        "[{:>width$} / {}] {:<8}{}  ({})\n",
                        n,
                        total,
                        status,
                        name,
                        msg,
                        width = width
                    ),
                    None => format!(
                        "[{:>width$} / {}] {:<8}{}\n",
                        n,
                        total,
                        status,
                        name,
                        width = width
                    ),
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Scanned { total } => serde_json::json!({
                "event": "scanned",
                "total": total
            }),
            ProgressEvent::DocumentDone {
                name,
                ok,
                message,
                n,
                total,
            } => serde_json::json!({
                "event": "document",
                "name": name,
                "ok": ok,
                "message": message,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to the pipeline.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
