//! Core data models used throughout draft-harvest.
//!
//! These types represent the documents, extracted fields, and normalized
//! records that flow through the extraction and aggregation pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical textual date form used in every output.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Label used for buckets whose key field is missing.
pub const UNSPECIFIED: &str = "Unspecified";

/// Document category, derived from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    DraftReport,
    DraftFindings,
    Unrecognized,
}

impl Classification {
    /// Classifies a file by case-insensitive substring match on its name.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("draft report") {
            Classification::DraftReport
        } else if lower.contains("draft findings") {
            Classification::DraftFindings
        } else {
            Classification::Unrecognized
        }
    }

    pub fn is_recognized(&self) -> bool {
        *self != Classification::Unrecognized
    }

    /// Fields a document of this class is expected to carry.
    pub fn expected_fields(&self) -> &'static [FieldKey] {
        match self {
            Classification::DraftReport => &[
                FieldKey::CompanyName,
                FieldKey::ProjectId,
                FieldKey::Location,
                FieldKey::ReportDate,
                FieldKey::MailReceivedDate,
            ],
            Classification::DraftFindings => &FieldKey::ALL,
            Classification::Unrecognized => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::DraftReport => "Draft Report",
            Classification::DraftFindings => "Draft Findings",
            Classification::Unrecognized => "Unrecognized",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of page text with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub number: usize,
    pub text: String,
}

/// Ordered text content of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    /// 0-based page index.
    pub index: usize,
    pub text: String,
    pub lines: Vec<TextLine>,
}

impl PageText {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| TextLine {
                number: i + 1,
                text: l.to_string(),
            })
            .collect();
        Self { index, text, lines }
    }
}

/// A candidate file selected by the directory scan.
#[derive(Debug, Clone)]
pub struct DocumentCandidate {
    pub path: PathBuf,
    /// Path relative to the scan root, used as the document identity.
    pub relative_path: String,
    pub name: String,
    pub classification: Classification,
}

/// An opened document. Never mutated after it is read.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub relative_path: String,
    pub classification: Classification,
    pub pages: Vec<PageText>,
}

impl SourceDocument {
    pub fn new(candidate: &DocumentCandidate, pages: Vec<PageText>) -> Self {
        Self {
            name: candidate.name.clone(),
            relative_path: candidate.relative_path.clone(),
            classification: candidate.classification,
            pages,
        }
    }
}

/// Enumerated field names recognized in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    CompanyName,
    ProjectId,
    SurveyId,
    Requestor,
    Location,
    ReportDate,
    MailReceivedDate,
}

impl FieldKey {
    pub const ALL: [FieldKey; 7] = [
        FieldKey::CompanyName,
        FieldKey::ProjectId,
        FieldKey::SurveyId,
        FieldKey::Requestor,
        FieldKey::Location,
        FieldKey::ReportDate,
        FieldKey::MailReceivedDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::CompanyName => "company_name",
            FieldKey::ProjectId => "project_id",
            FieldKey::SurveyId => "survey_id",
            FieldKey::Requestor => "requestor",
            FieldKey::Location => "location",
            FieldKey::ReportDate => "report_date",
            FieldKey::MailReceivedDate => "mail_received_date",
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, FieldKey::ReportDate | FieldKey::MailReceivedDate)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in a document a value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub page: usize,
    pub line: Option<usize>,
}

/// A raw field value pulled out of a document, or an explicit miss.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedField {
    pub key: FieldKey,
    /// `None` marks a required field that no rule matched.
    pub raw: Option<String>,
    pub location: Option<SourceLocation>,
}

impl ExtractedField {
    pub fn found(key: FieldKey, raw: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            key,
            raw: Some(raw.into()),
            location: Some(location),
        }
    }

    pub fn missing(key: FieldKey) -> Self {
        Self {
            key,
            raw: None,
            location: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.raw.is_none()
    }
}

/// Columns of the manufacturer statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableColumn {
    Percentage,
    LooseUnits,
    FullCases,
    LooseRepeat,
    CasesRepeat,
}

/// One manufacturer table row as it appears in the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawManufacturerRow {
    pub name: String,
    pub cells: Vec<(TableColumn, String)>,
    pub location: SourceLocation,
}

impl RawManufacturerRow {
    pub fn cell(&self, column: TableColumn) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Typed value of a normalized field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    /// Not found, or found but unparseable (`raw` keeps the original text).
    Missing { raw: Option<String> },
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            FieldValue::Missing { .. } => Ok(()),
        }
    }
}

/// A manufacturer table row after numeric parsing and name canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManufacturerRow {
    pub raw_name: String,
    pub canonical: String,
    pub stock_observation_percentage: Option<f64>,
    pub affected_loose_units: Option<u64>,
    pub affected_full_cases: Option<u64>,
    pub affected_loose_repeat_batch: Option<u64>,
    pub affected_cases_repeat_batch: Option<u64>,
    /// A value carried a superscript or `**` exponent marker.
    pub has_exponential: bool,
}

impl ManufacturerRow {
    pub fn total_repeated(&self) -> u64 {
        self.affected_loose_repeat_batch
            .unwrap_or(0)
            .saturating_add(self.affected_cases_repeat_batch.unwrap_or(0))
    }
}

/// One document's fields after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub document: String,
    pub relative_path: String,
    pub classification: Classification,
    /// Holds every key of [`FieldKey::ALL`].
    pub fields: BTreeMap<FieldKey, FieldValue>,
    pub manufacturers: Vec<ManufacturerRow>,
    /// Short code of the requesting bottler, when resolvable.
    pub injured_bottler: Option<String>,
}

impl NormalizedRecord {
    pub fn field(&self, key: FieldKey) -> &FieldValue {
        static MISSING: FieldValue = FieldValue::Missing { raw: None };
        self.fields.get(&key).unwrap_or(&MISSING)
    }

    pub fn text(&self, key: FieldKey) -> Option<&str> {
        self.field(key).as_text()
    }

    pub fn date(&self, key: FieldKey) -> Option<NaiveDate> {
        self.field(key).as_date()
    }

    pub fn missing_fields(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_missing())
            .map(|(k, _)| *k)
    }
}
