//! Run orchestration.
//!
//! Coordinates the full flow: scan → read → extract → normalize →
//! aggregate → assemble → write. Per-document work runs on blocking worker
//! threads with a bounded number of documents in flight; results are merged
//! into the aggregator on the driving task only, so the aggregator has a
//! single writer. A [`StopSignal`] stops new documents from starting while
//! in-flight ones finish, leaving a smaller but consistent state.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::aggregate::{AggregateState, RecordAggregator};
use crate::config::Config;
use crate::connector_fs;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity, Stage};
use crate::export;
use crate::extract::{Extraction, FieldExtractor};
use crate::models::{Classification, DocumentCandidate, FieldKey, NormalizedRecord, SourceDocument};
use crate::normalize::{normalize, AliasTables};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::reader::{DocumentReader, PdfReader};
use crate::report::{ReportAssembler, ReportKind};
use crate::xlsx;

/// Cooperative stop flag shared between the CLI and the pipeline.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a document was left out of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    UnreadableDocument(String),
    ClassificationFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnreadableDocument(d) => write!(f, "unreadable: {}", d),
            SkipReason::ClassificationFailed(d) => write!(f, "not classified: {}", d),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub name: String,
    pub relative_path: String,
    pub reason: SkipReason,
}

/// Counts and outcomes of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scanned: usize,
    /// PDFs whose name is neither a report nor findings.
    pub ignored: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedDocument>,
    pub missing_fields: BTreeMap<FieldKey, usize>,
    /// Documents whose worker task vanished without an outcome.
    pub lost: usize,
    pub stopped_early: bool,
    pub warnings: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Files written by this run.
    pub outputs: Vec<PathBuf>,
}

/// Result of processing a single document on a worker.
#[derive(Debug)]
pub enum DocumentOutcome {
    Record {
        record: NormalizedRecord,
        diagnostics: Vec<Diagnostic>,
    },
    Skipped {
        reason: SkipReason,
        diagnostics: Vec<Diagnostic>,
    },
}

/// Everything a worker needs, shared read-only across threads.
pub struct Pipeline {
    reader: Arc<dyn DocumentReader>,
    extractor: Arc<FieldExtractor>,
    aliases: Arc<AliasTables>,
    workers: usize,
}

impl Pipeline {
    pub fn new(config: &Config, reader: Arc<dyn DocumentReader>) -> Result<Self> {
        Ok(Self {
            reader,
            extractor: Arc::new(FieldExtractor::from_config(config)?),
            aliases: Arc::new(AliasTables::from_config(&config.aliases)),
            workers: config.pipeline.workers.max(1),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Arc::new(PdfReader::new(config.input.max_file_bytes)))
    }

    /// Processes `candidates` and folds every usable record into a fresh
    /// aggregate state.
    pub async fn run(
        &self,
        candidates: Vec<DocumentCandidate>,
        progress: &dyn ProgressReporter,
        sink: &dyn DiagnosticSink,
        stop: &StopSignal,
    ) -> (AggregateState, RunReport) {
        let total = candidates.len() as u64;
        let mut report = RunReport {
            scanned: candidates.len(),
            ..RunReport::default()
        };
        let mut aggregator = RecordAggregator::new();
        let mut queue = candidates.into_iter();
        let mut in_flight: JoinSet<(String, String, DocumentOutcome)> = JoinSet::new();
        let mut done = 0u64;

        progress.report(ProgressEvent::Scanned { total });

        loop {
            while in_flight.len() < self.workers && !stop.is_stopped() {
                let Some(candidate) = queue.next() else {
                    break;
                };
                let reader = Arc::clone(&self.reader);
                let extractor = Arc::clone(&self.extractor);
                let aliases = Arc::clone(&self.aliases);
                let name = candidate.name.clone();
                let relative_path = candidate.relative_path.clone();
                in_flight.spawn(async move {
                    let worker = tokio::task::spawn_blocking(move || {
                        process_guarded(reader.as_ref(), &extractor, &aliases, &candidate)
                    });
                    let outcome = match worker.await {
                        Ok(outcome) => outcome,
                        Err(e) => worker_failed(&name, &e.to_string()),
                    };
                    (name, relative_path, outcome)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (name, relative_path, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // Only reachable on runtime shutdown.
                    log::error!("worker task failed: {}", e);
                    report.lost += 1;
                    continue;
                }
            };

            done += 1;
            let (ok, message, diagnostics) = match outcome {
                DocumentOutcome::Record {
                    record,
                    diagnostics,
                } => {
                    aggregator.add(record);
                    report.succeeded += 1;
                    (true, None, diagnostics)
                }
                DocumentOutcome::Skipped {
                    reason,
                    diagnostics,
                } => {
                    let message = reason.to_string();
                    report.skipped.push(SkippedDocument {
                        name: name.clone(),
                        relative_path,
                        reason,
                    });
                    (false, Some(message), diagnostics)
                }
            };
            for d in &diagnostics {
                sink.emit(d);
                if d.severity >= Severity::Warning {
                    report.warnings += 1;
                }
            }
            report.diagnostics.extend(diagnostics);

            progress.report(ProgressEvent::DocumentDone {
                name,
                ok,
                message,
                n: done,
                total,
            });
        }

        let remaining = queue.len();
        report.stopped_early = remaining != 0;
        if report.stopped_early {
            log::warn!("stopped early: {} documents were not started", remaining);
        }
        report.skipped.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        report.diagnostics.sort_by(|a, b| a.document.cmp(&b.document));

        let state = aggregator.into_state();
        report.missing_fields = state.missing_fields.clone();
        (state, report)
    }
}

fn worker_failed(name: &str, detail: &str) -> DocumentOutcome {
    let message = format!("worker failed: {}", detail);
    DocumentOutcome::Skipped {
        reason: SkipReason::UnreadableDocument(message.clone()),
        diagnostics: vec![Diagnostic::error(name, Stage::Read, message)],
    }
}

fn process_guarded(
    reader: &dyn DocumentReader,
    extractor: &FieldExtractor,
    aliases: &AliasTables,
    candidate: &DocumentCandidate,
) -> DocumentOutcome {
    // Reader panics become skipped documents.
    panic::catch_unwind(AssertUnwindSafe(|| {
        process_document(reader, extractor, aliases, candidate)
    }))
    .unwrap_or_else(|_| worker_failed(&candidate.name, "reader panicked"))
}

/// Read, extract, and normalize one document.
pub fn process_document(
    reader: &dyn DocumentReader,
    extractor: &FieldExtractor,
    aliases: &AliasTables,
    candidate: &DocumentCandidate,
) -> DocumentOutcome {
    let pages = match reader.open(&candidate.path) {
        Ok(pages) => pages,
        Err(e) => {
            return DocumentOutcome::Skipped {
                reason: SkipReason::UnreadableDocument(e.to_string()),
                diagnostics: vec![Diagnostic::error(&candidate.name, Stage::Read, e.to_string())],
            }
        }
    };
    let doc = SourceDocument::new(candidate, pages);
    let extraction = extractor.extract(&doc);
    drop(doc);

    let mut diagnostics = extraction.diagnostics.clone();
    if let Some(failure) = extraction.classification_failure() {
        diagnostics.push(Diagnostic::warning(
            &candidate.name,
            Stage::Extract,
            failure.clone(),
        ));
        return DocumentOutcome::Skipped {
            reason: SkipReason::ClassificationFailed(failure),
            diagnostics,
        };
    }

    let normalized = normalize(&extraction, aliases);
    diagnostics.extend(normalized.diagnostics);
    DocumentOutcome::Record {
        record: normalized.record,
        diagnostics,
    }
}

/// Options of `harvest run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    /// Path of the original workbook; `None` picks a timestamped name in
    /// the input directory.
    pub original: Option<PathBuf>,
    pub write_original: bool,
    pub report: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            original: None,
            write_original: true,
            report: None,
            json: None,
        }
    }
}

pub fn default_original_path(input: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    input.join(format!("pdf_extraction_original_{}.xlsx", stamp))
}

/// Scans, processes, and writes the requested outputs.
pub async fn run_harvest(
    config: &Config,
    options: &RunOptions,
    pipeline: &Pipeline,
    progress: &dyn ProgressReporter,
    sink: &dyn DiagnosticSink,
    stop: &StopSignal,
) -> Result<(AggregateState, RunReport)> {
    let scan = connector_fs::scan_directory(&options.input, &config.input)?;
    let ignored = scan.ignored;

    let (state, mut report) = pipeline.run(scan.candidates, progress, sink, stop).await;
    report.ignored = ignored;

    let assembler = ReportAssembler::new(config.audit.clone());
    if options.write_original {
        let path = options
            .original
            .clone()
            .unwrap_or_else(|| default_original_path(&options.input));
        let shape = assembler.assemble(&state, ReportKind::Original);
        xlsx::write_workbook(&shape, &path)
            .with_context(|| format!("Failed to write {} workbook", ReportKind::Original))?;
        report.outputs.push(path);
    }
    if let Some(path) = &options.report {
        let shape = assembler.assemble(&state, ReportKind::Report);
        xlsx::write_workbook(&shape, path)
            .with_context(|| format!("Failed to write {} workbook", ReportKind::Report))?;
        report.outputs.push(path.clone());
    }
    if let Some(path) = &options.json {
        export::write_json(&state, &report, path)?;
        report.outputs.push(path.clone());
    }

    Ok((state, report))
}

/// Per-document dump used by `harvest inspect`.
#[derive(Debug, Serialize)]
pub struct Inspection {
    pub extraction: Extraction,
    pub record: Option<NormalizedRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn inspect_file(config: &Config, path: &Path) -> Result<Inspection> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let candidate = DocumentCandidate {
        path: path.to_path_buf(),
        relative_path: name.clone(),
        classification: Classification::from_file_name(&name),
        name,
    };
    let reader = PdfReader::new(config.input.max_file_bytes);
    let pages = reader
        .open(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = SourceDocument::new(&candidate, pages);

    let extractor = FieldExtractor::from_config(config)?;
    let extraction = extractor.extract(&doc);
    let mut diagnostics = extraction.diagnostics.clone();
    let record = if extraction.is_classified() {
        let normalized = normalize(&extraction, &AliasTables::from_config(&config.aliases));
        diagnostics.extend(normalized.diagnostics);
        Some(normalized.record)
    } else {
        None
    };

    Ok(Inspection {
        extraction,
        record,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::models::PageText;
    use crate::progress::NoProgress;
    use crate::reader::DocumentError;
    use std::collections::HashMap;

    struct FakeReader(HashMap<String, &'static str>);

    impl DocumentReader for FakeReader {
        fn open(&self, path: &Path) -> Result<Vec<PageText>, DocumentError> {
            let key = path.to_string_lossy().to_string();
            match self.0.get(&key) {
                Some(text) => Ok(vec![PageText::new(0, *text)]),
                None => Err(DocumentError::Unreadable("corrupt".into())),
            }
        }
    }

    fn candidate(name: &str) -> DocumentCandidate {
        DocumentCandidate {
            path: PathBuf::from(name),
            relative_path: name.to_string(),
            name: name.to_string(),
            classification: Classification::from_file_name(name),
        }
    }

    const FINDINGS: &str = "Survey ID: SR1042\nRequestor: Moon Beverages Limited\nDate: 2023-06-01";

    fn pipeline(docs: &[(&str, &'static str)], workers: usize) -> Pipeline {
        let mut config = Config::minimal();
        config.pipeline.workers = workers;
        let reader = FakeReader(docs.iter().map(|(k, v)| (k.to_string(), *v)).collect());
        Pipeline::new(&config, Arc::new(reader)).unwrap()
    }

    #[tokio::test]
    async fn corrupt_document_is_skipped() {
        let p = pipeline(&[("a Draft Findings.pdf", FINDINGS)], 2);
        let sink = CollectingSink::new();
        let (state, report) = p
            .run(
                vec![candidate("a Draft Findings.pdf"), candidate("b Draft Report.pdf")],
                &NoProgress,
                &sink,
                &StopSignal::new(),
            )
            .await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].reason, SkipReason::UnreadableDocument(_)));
        assert_eq!(state.records, 1);
        assert!(!sink.entries().is_empty());
    }

    #[tokio::test]
    async fn unclassified_document_is_skipped() {
        let p = pipeline(&[("c Draft Report.pdf", "nothing useful here")], 1);
        let (state, report) = p
            .run(
                vec![candidate("c Draft Report.pdf")],
                &NoProgress,
                &CollectingSink::new(),
                &StopSignal::new(),
            )
            .await;
        assert_eq!(state.records, 0);
        assert!(matches!(report.skipped[0].reason, SkipReason::ClassificationFailed(_)));
    }

    #[tokio::test]
    async fn stop_before_start_processes_nothing() {
        let p = pipeline(&[("a Draft Findings.pdf", FINDINGS)], 1);
        let stop = StopSignal::new();
        stop.stop();
        let (state, report) = p
            .run(
                vec![candidate("a Draft Findings.pdf")],
                &NoProgress,
                &CollectingSink::new(),
                &stop,
            )
            .await;
        assert!(report.stopped_early);
        assert_eq!(report.succeeded, 0);
        assert_eq!(state, AggregateState::default());
    }

    struct StopAfterFirst(StopSignal);

    impl ProgressReporter for StopAfterFirst {
        fn report(&self, event: ProgressEvent) {
            if let ProgressEvent::DocumentDone { .. } = event {
                self.0.stop();
            }
        }
    }

    #[tokio::test]
    async fn stop_mid_run_keeps_finished_document() {
        let docs: Vec<(String, &'static str)> = (0..3)
            .map(|i| (format!("{} Draft Findings.pdf", i), FINDINGS))
            .collect();
        let refs: Vec<(&str, &'static str)> = docs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let candidates: Vec<DocumentCandidate> = docs.iter().map(|(k, _)| candidate(k)).collect();

        let stop = StopSignal::new();
        let (state, report) = pipeline(&refs, 1)
            .run(
                candidates,
                &StopAfterFirst(stop.clone()),
                &CollectingSink::new(),
                &stop,
            )
            .await;

        assert!(report.stopped_early);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.succeeded, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(state.records, 1);

        let first = "0 Draft Findings.pdf";
        assert_eq!(state.basic_info.keys().collect::<Vec<_>>(), vec![first]);
        assert_eq!(state.summary.keys().collect::<Vec<_>>(), vec![first]);
        assert_eq!(state.tracker_rows(), 1);
        assert!(state
            .tracker
            .values()
            .all(|t| t.rows.keys().all(|k| k == first)));
        assert_eq!(state.manufacturer_count_total(), 1);
    }

    struct PanickingReader;

    impl DocumentReader for PanickingReader {
        fn open(&self, path: &Path) -> Result<Vec<PageText>, DocumentError> {
            if path.to_string_lossy().starts_with("bad") {
                panic!("malformed xref");
            }
            Ok(vec![PageText::new(0, FINDINGS)])
        }
    }

    #[tokio::test]
    async fn reader_panic_is_counted_as_skipped() {
        let p = Pipeline::new(&Config::minimal(), Arc::new(PanickingReader)).unwrap();
        let (state, report) = p
            .run(
                vec![
                    candidate("bad Draft Findings.pdf"),
                    candidate("good Draft Findings.pdf"),
                ],
                &NoProgress,
                &CollectingSink::new(),
                &StopSignal::new(),
            )
            .await;

        assert_eq!(state.records, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.lost, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].relative_path, "bad Draft Findings.pdf");
        assert!(report.skipped[0].reason.to_string().contains("reader panicked"));
        assert_eq!(
            report.succeeded + report.skipped.len() + report.lost,
            report.scanned
        );
    }

    #[tokio::test]
    async fn worker_count_does_not_change_result() {
        let docs: Vec<(String, &'static str)> = (0..6)
            .map(|i| (format!("{} Draft Findings.pdf", i), FINDINGS))
            .collect();
        let refs: Vec<(&str, &'static str)> = docs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let candidates: Vec<DocumentCandidate> = docs.iter().map(|(k, _)| candidate(k)).collect();

        let (one, _) = pipeline(&refs, 1)
            .run(candidates.clone(), &NoProgress, &CollectingSink::new(), &StopSignal::new())
            .await;
        let (four, _) = pipeline(&refs, 4)
            .run(candidates, &NoProgress, &CollectingSink::new(), &StopSignal::new())
            .await;
        assert_eq!(one, four);
        assert_eq!(one.records, 6);
    }
}
