//! Workbook assembly.
//!
//! Projects an [`AggregateState`] into tabular [`WorkbookShape`]s. Two
//! shapes exist: the "original" workbook (per-document basic info plus
//! manufacturer statistics) and the "report" workbook (the injured tracker
//! and the per-document source summary). Assembly is a pure function of the
//! state; writing the shape to disk is the job of [`crate::xlsx`].

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::AggregateState;
use crate::config::AuditConfig;
use crate::models::DATE_FORMAT;

pub const SHEET_BASIC_INFO: &str = "Basic Info";
pub const SHEET_MANUFACTURER_STATS: &str = "Manufacturer Stats";
pub const SHEET_TRACKER: &str = "Injured - Tracker 2022+2023";
pub const SHEET_SOURCE_SUMMARY: &str = "Source - Report Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Original,
    Report,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Original => f.write_str("original"),
            ReportKind::Report => f.write_str("report"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Int(u64),
    Number(f64),
}

impl Cell {
    fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    fn opt_text(s: Option<&str>) -> Self {
        s.map(Cell::text).unwrap_or(Cell::Empty)
    }

    fn date(d: Option<NaiveDate>) -> Self {
        d.map(|d| Cell::Text(d.format(DATE_FORMAT).to_string()))
            .unwrap_or(Cell::Empty)
    }

    fn count(n: Option<u64>) -> Self {
        n.map(Cell::Int).unwrap_or(Cell::Empty)
    }

    /// Rendered text, used for width estimation and plain-text dumps.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Number(x) => x.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// Column indexes rendered centered.
    pub centered: Vec<usize>,
}

impl Sheet {
    fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            centered: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkbookShape {
    pub kind: ReportKind,
    pub sheets: Vec<Sheet>,
}

impl WorkbookShape {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

pub struct ReportAssembler {
    audit: AuditConfig,
}

impl ReportAssembler {
    pub fn new(audit: AuditConfig) -> Self {
        Self { audit }
    }

    pub fn assemble(&self, state: &AggregateState, kind: ReportKind) -> WorkbookShape {
        let sheets = match kind {
            ReportKind::Original => vec![basic_info_sheet(state), manufacturer_sheet(state)],
            ReportKind::Report => vec![self.tracker_sheet(state), source_summary_sheet(state)],
        };
        WorkbookShape { kind, sheets }
    }

    fn tracker_sheet(&self, state: &AggregateState) -> Sheet {
        let mut sheet = Sheet::new(
            SHEET_TRACKER,
            &[
                "Sr. No",
                "Year",
                "Survey No",
                "Injured Bottler",
                "Location",
                "Mail Received - Date",
                "Report Received Date",
                "Injured Mail Subject",
                "Audit Planned by",
            ],
        );
        sheet.centered.push(0);

        let mut serial = 0u64;
        for entry in state.tracker.values() {
            for row in entry.rows.values() {
                serial += 1;
                let survey = row.survey_no.as_deref().unwrap_or("");
                sheet.rows.push(vec![
                    Cell::Int(serial),
                    Cell::text(entry.key.year.clone()),
                    Cell::text(survey),
                    Cell::opt_text(row.injured_bottler.as_deref()),
                    Cell::opt_text(row.location.as_deref()),
                    Cell::date(row.mail_received),
                    Cell::date(row.report_date),
                    Cell::opt_text(
                        mail_subject(
                            row.injured_bottler.as_deref(),
                            row.location.as_deref(),
                            row.survey_no.as_deref(),
                        )
                        .as_deref(),
                    ),
                    Cell::text(self.audit.planner_for(survey)),
                ]);
            }
        }
        sheet
    }
}

/// `{bottler}-{location}-{survey}` when all three are known.
pub fn mail_subject(
    bottler: Option<&str>,
    location: Option<&str>,
    survey: Option<&str>,
) -> Option<String> {
    match (bottler, location, survey) {
        (Some(b), Some(l), Some(s)) if !b.is_empty() && !l.is_empty() && !s.is_empty() => {
            Some(format!("{}-{}-{}", b, l, s))
        }
        _ => None,
    }
}

fn basic_info_sheet(state: &AggregateState) -> Sheet {
    let mut sheet = Sheet::new(
        SHEET_BASIC_INFO,
        &[
            "File Name",
            "Company Name",
            "Project ID",
            "Location",
            "Date",
            "Mail Received - Date",
        ],
    );
    for row in state.basic_info.values() {
        sheet.rows.push(vec![
            Cell::text(row.file_name.clone()),
            Cell::text(row.company_name.clone()),
            Cell::text(row.project_id.clone()),
            Cell::text(row.location.clone()),
            Cell::text(row.date.clone()),
            Cell::text(row.mail_received_date.clone()),
        ]);
    }
    sheet
}

fn manufacturer_sheet(state: &AggregateState) -> Sheet {
    let mut sheet = Sheet::new(
        SHEET_MANUFACTURER_STATS,
        &[
            "Manufacturer",
            "Documents",
            "Source Files",
            "Loose Units",
            "Full Cases",
            "Repeated Loose",
            "Repeated Cases",
            "Exponential Flags",
        ],
    );
    for entry in state.manufacturers.values() {
        let files: Vec<&str> = entry.documents.iter().map(String::as_str).collect();
        sheet.rows.push(vec![
            Cell::text(entry.canonical.clone()),
            Cell::Int(entry.count as u64),
            Cell::text(files.join("; ")),
            Cell::Int(entry.totals.loose_units),
            Cell::Int(entry.totals.full_cases),
            Cell::Int(entry.totals.loose_repeat),
            Cell::Int(entry.totals.cases_repeat),
            Cell::Int(entry.exponential_rows as u64),
        ]);
    }
    sheet
}

fn source_summary_sheet(state: &AggregateState) -> Sheet {
    let mut sheet = Sheet::new(
        SHEET_SOURCE_SUMMARY,
        &[
            "No.",
            "Survey No",
            "Injured",
            "Location",
            "Bottler Name",
            "Report Rec. Date",
            "% of outlets at which stock was observed",
            "Loose no of units",
            "Full cases count",
            "Repeated LOOSE - Case",
            "Repeated FULL - Case",
            "TOTAL REPEATED",
        ],
    );
    sheet.centered.push(0);

    // "No." restarts for each survey number.
    let mut per_survey: HashMap<&str, u64> = HashMap::new();
    for entry in state.summary.values() {
        let survey = entry.survey_no.as_deref().unwrap_or("");
        for row in &entry.rows {
            let n = per_survey.entry(survey).or_insert(0);
            *n += 1;
            sheet.rows.push(vec![
                Cell::Int(*n),
                Cell::text(survey),
                Cell::opt_text(entry.injured_bottler.as_deref()),
                Cell::opt_text(entry.location.as_deref()),
                Cell::opt_text(row.raw_name.as_deref()),
                Cell::date(entry.report_date),
                row.stock_observation_percentage
                    .map(Cell::Number)
                    .unwrap_or(Cell::Empty),
                Cell::count(row.loose_units),
                Cell::count(row.full_cases),
                Cell::count(row.loose_repeat),
                Cell::count(row.cases_repeat),
                match row.total_repeated {
                    0 => Cell::text("-"),
                    n => Cell::Int(n),
                },
            ]);
        }
    }
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RecordAggregator;
    use crate::models::{
        Classification, FieldKey, FieldValue, ManufacturerRow, NormalizedRecord,
    };
    use std::collections::BTreeMap;

    fn record(doc: &str, survey: &str, bottler: Option<&str>, rows: Vec<ManufacturerRow>) -> NormalizedRecord {
        let mut fields: BTreeMap<FieldKey, FieldValue> = FieldKey::ALL
            .iter()
            .map(|k| (*k, FieldValue::Missing { raw: None }))
            .collect();
        fields.insert(FieldKey::ProjectId, FieldValue::Text(survey.into()));
        fields.insert(FieldKey::Location, FieldValue::Text("Lucknow".into()));
        fields.insert(
            FieldKey::ReportDate,
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 4, 5).unwrap()),
        );
        NormalizedRecord {
            document: doc.into(),
            relative_path: doc.into(),
            classification: Classification::DraftFindings,
            fields,
            manufacturers: rows,
            injured_bottler: bottler.map(str::to_string),
        }
    }

    fn mrow(name: &str, loose_repeat: u64, cases_repeat: u64) -> ManufacturerRow {
        ManufacturerRow {
            raw_name: name.into(),
            canonical: name.into(),
            stock_observation_percentage: Some(12.5),
            affected_loose_units: Some(10),
            affected_full_cases: Some(2),
            affected_loose_repeat_batch: Some(loose_repeat),
            affected_cases_repeat_batch: Some(cases_repeat),
            has_exponential: false,
        }
    }

    fn state() -> AggregateState {
        let mut agg = RecordAggregator::new();
        agg.add(record(
            "a.pdf",
            "SR1042",
            Some("SLMG"),
            vec![mrow("Acme", 1, 2), mrow("Beta", 0, 0)],
        ));
        agg.add(record("b.pdf", "KB204", None, vec![]));
        agg.into_state()
    }

    fn assembler() -> ReportAssembler {
        ReportAssembler::new(AuditConfig::default())
    }

    #[test]
    fn original_has_basic_info_and_stats() {
        let shape = assembler().assemble(&state(), ReportKind::Original);
        let basic = shape.sheet(SHEET_BASIC_INFO).unwrap();
        assert_eq!(basic.rows.len(), 2);
        assert_eq!(basic.rows[0][4], Cell::Text("05-04-2023".into()));
        let stats = shape.sheet(SHEET_MANUFACTURER_STATS).unwrap();
        let names: Vec<String> = stats.rows.iter().map(|r| r[0].display()).collect();
        assert_eq!(names, vec!["Acme", "Beta", "Unspecified"]);
    }

    #[test]
    fn tracker_rows_carry_subject_and_planner() {
        let shape = assembler().assemble(&state(), ReportKind::Report);
        let tracker = shape.sheet(SHEET_TRACKER).unwrap();
        assert_eq!(tracker.rows.len(), 2);
        assert_eq!(tracker.centered, vec![0]);
        let subject = tracker.column("Injured Mail Subject").unwrap();
        let planner = tracker.column("Audit Planned by").unwrap();
        // ("2023", "SLMG") sorts before ("2023", "Unspecified").
        assert_eq!(tracker.rows[0][subject], Cell::Text("SLMG-Lucknow-SR1042".into()));
        assert_eq!(tracker.rows[0][planner], Cell::Text("BDO".into()));
        assert_eq!(tracker.rows[1][subject], Cell::Empty);
        assert_eq!(tracker.rows[1][planner], Cell::Text("EY".into()));
        assert_eq!(tracker.rows[1][0], Cell::Int(2));
    }

    #[test]
    fn source_summary_numbers_rows_per_survey() {
        let shape = assembler().assemble(&state(), ReportKind::Report);
        let summary = shape.sheet(SHEET_SOURCE_SUMMARY).unwrap();
        assert_eq!(summary.rows.len(), 3);
        let numbers: Vec<Cell> = summary.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(numbers, vec![Cell::Int(1), Cell::Int(2), Cell::Int(1)]);
        let total = summary.column("TOTAL REPEATED").unwrap();
        assert_eq!(summary.rows[0][total], Cell::Int(3));
        assert_eq!(summary.rows[1][total], Cell::Text("-".into()));
        assert_eq!(summary.rows[2][4], Cell::Empty);
    }

    #[test]
    fn bottler_name_shows_printed_manufacturer() {
        let mut row = mrow("Acme", 0, 0);
        row.raw_name = "ACME Bottling Co.".into();
        let mut agg = RecordAggregator::new();
        agg.add(record("c.pdf", "SR2001", None, vec![row]));

        let shape = assembler().assemble(agg.snapshot(), ReportKind::Report);
        let summary = shape.sheet(SHEET_SOURCE_SUMMARY).unwrap();
        let bottler = summary.column("Bottler Name").unwrap();
        assert_eq!(summary.rows[0][bottler], Cell::Text("ACME Bottling Co.".into()));

        let original = assembler().assemble(agg.snapshot(), ReportKind::Original);
        let stats = original.sheet(SHEET_MANUFACTURER_STATS).unwrap();
        assert_eq!(stats.rows[0][0], Cell::Text("Acme".into()));
    }

    #[test]
    fn assembly_leaves_state_untouched() {
        let s = state();
        let before = s.clone();
        let _ = assembler().assemble(&s, ReportKind::Original);
        let _ = assembler().assemble(&s, ReportKind::Report);
        assert_eq!(s, before);
    }
}
