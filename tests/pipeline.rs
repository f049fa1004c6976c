//! Library-level run tests: a fake reader stands in for PDF parsing so the
//! whole scan → extract → aggregate → workbook path runs on plain text.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use draft_harvest::config::Config;
use draft_harvest::diagnostics::CollectingSink;
use draft_harvest::ingest::{self, Pipeline, RunOptions, SkipReason, StopSignal};
use draft_harvest::models::{FieldKey, PageText};
use draft_harvest::progress::NoProgress;
use draft_harvest::reader::{DocumentError, DocumentReader};
use draft_harvest::report::{
    ReportAssembler, ReportKind, SHEET_MANUFACTURER_STATS, SHEET_SOURCE_SUMMARY, SHEET_TRACKER,
};
use tempfile::TempDir;

/// Serves page text by file name; anything unknown is unreadable.
struct TextReader(HashMap<String, Vec<String>>);

impl DocumentReader for TextReader {
    fn open(&self, path: &Path) -> Result<Vec<PageText>, DocumentError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match self.0.get(&name) {
            Some(pages) => Ok(pages
                .iter()
                .enumerate()
                .map(|(i, t)| PageText::new(i, t.as_str()))
                .collect()),
            None => Err(DocumentError::Unreadable("no text layer".into())),
        }
    }
}

const REPORT_COVER: &str = "Confidential\n\
    Moon Beverages Limited\n\
    Project Stellar\n\
    Project ID: KB204, North Delhi\n\
    Report date 12 March 2023";

const REPORT_SUMMARY: &str = "Summary of information gathered\n\
    The request was received by us on 2nd February 2023.\n\
    Manufacturer % of outlets Loose units Full cases Loose repeat Cases repeat\n\
    Acme Bottling Co. 25% 1,200 30 4 -\n\
    Beta Drinks Pvt Ltd 10% 50 2 0 0\n\
    Total 35% 1,250 32 4 0\n\
    Annexure A";

const FINDINGS: &str = "Draft Findings\n\
    Survey ID: SR1042\n\
    Requestor: SLMG Beverages Private Limited\n\
    Lucknow, Uttar Pradesh\n\
    Date: 2023-06-01";

struct Fixture {
    _tmp: TempDir,
    dir: std::path::PathBuf,
    pipeline: Pipeline,
    config: Config,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("reports");
    fs::create_dir_all(dir.join("2023")).unwrap();
    for name in [
        "KB204 Draft Report.pdf",
        "2023/SR1042 Draft Findings.pdf",
        "ZZ900 Draft Report.pdf",
        "summary.pdf",
    ] {
        fs::write(dir.join(name), b"%PDF-1.4").unwrap();
    }

    let mut pages = HashMap::new();
    pages.insert(
        "KB204 Draft Report.pdf".to_string(),
        vec![REPORT_COVER.to_string(), REPORT_SUMMARY.to_string()],
    );
    pages.insert("SR1042 Draft Findings.pdf".to_string(), vec![FINDINGS.to_string()]);

    let config = Config::minimal();
    let pipeline = Pipeline::new(&config, Arc::new(TextReader(pages))).unwrap();
    Fixture {
        _tmp: tmp,
        dir,
        pipeline,
        config,
    }
}

fn zip_entry(path: &Path, name: &str) -> String {
    let file = fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    out
}

#[tokio::test]
async fn run_aggregates_and_skips() {
    let fx = fixture();
    let sink = CollectingSink::new();
    let (state, report) = ingest::run_harvest(
        &fx.config,
        &RunOptions {
            write_original: false,
            ..RunOptions::new(&fx.dir)
        },
        &fx.pipeline,
        &NoProgress,
        &sink,
        &StopSignal::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].relative_path, "ZZ900 Draft Report.pdf");
    assert!(matches!(report.skipped[0].reason, SkipReason::UnreadableDocument(_)));
    assert!(report.outputs.is_empty());

    assert_eq!(state.records, 2);
    assert!(state.basic_info.contains_key("KB204 Draft Report.pdf"));
    assert!(state.basic_info.contains_key("2023/SR1042 Draft Findings.pdf"));

    // Two manufacturers from the report, one "Unspecified" for the findings.
    assert_eq!(state.manufacturer_count_total(), 3);
    assert!(state.manufacturers.contains_key("Beta Drinks Pvt Ltd"));
    assert_eq!(state.tracker_rows(), 2);

    // The findings document names no mail date.
    assert_eq!(
        report.missing_fields.get(&FieldKey::MailReceivedDate).copied(),
        Some(1)
    );
}

#[tokio::test]
async fn report_workbook_has_tracker_and_summary() {
    let fx = fixture();
    let (state, _) = fx
        .pipeline
        .run(
            draft_harvest::connector_fs::scan_directory(&fx.dir, &fx.config.input)
                .unwrap()
                .candidates,
            &NoProgress,
            &CollectingSink::new(),
            &StopSignal::new(),
        )
        .await;

    let shape = ReportAssembler::new(fx.config.audit.clone()).assemble(&state, ReportKind::Report);
    let tracker = shape.sheet(SHEET_TRACKER).unwrap();
    assert_eq!(tracker.rows.len(), 2);
    let planner = tracker.column("Audit Planned by").unwrap();
    let survey = tracker.column("Survey No").unwrap();
    let sr = tracker
        .rows
        .iter()
        .find(|r| r[survey].display() == "SR1042")
        .unwrap();
    assert_eq!(sr[planner].display(), "BDO");
    let kb = tracker
        .rows
        .iter()
        .find(|r| r[survey].display() == "KB204")
        .unwrap();
    assert_eq!(kb[planner].display(), "EY");

    let summary = shape.sheet(SHEET_SOURCE_SUMMARY).unwrap();
    // Two table rows plus one placeholder for the findings document.
    assert_eq!(summary.rows.len(), 3);
    assert!(shape.sheet(SHEET_MANUFACTURER_STATS).is_none());
}

#[tokio::test]
async fn both_workbooks_are_written() {
    let fx = fixture();
    let out = fx._tmp.path().join("out");
    let original = out.join("original.xlsx");
    let report_path = out.join("report.xlsx");
    let json = out.join("state.json");

    let (_, report) = ingest::run_harvest(
        &fx.config,
        &RunOptions {
            original: Some(original.clone()),
            report: Some(report_path.clone()),
            json: Some(json.clone()),
            ..RunOptions::new(&fx.dir)
        },
        &fx.pipeline,
        &NoProgress,
        &CollectingSink::new(),
        &StopSignal::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outputs, vec![original.clone(), report_path.clone(), json.clone()]);

    let workbook = zip_entry(&original, "xl/workbook.xml");
    assert!(workbook.contains("Basic Info"));
    assert!(workbook.contains("Manufacturer Stats"));
    let sheet = zip_entry(&original, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("Moon Beverages Limited"));

    let workbook = zip_entry(&report_path, "xl/workbook.xml");
    assert!(workbook.contains("Injured - Tracker 2022+2023"));

    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(v["run"]["succeeded"], 2);
}
