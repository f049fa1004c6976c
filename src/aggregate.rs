//! Cross-document aggregation.
//!
//! [`RecordAggregator`] folds [`NormalizedRecord`]s into an
//! [`AggregateState`]. Every collection in the state is an ordered map or
//! set keyed by value, so the final state does not depend on the order in
//! which records arrive. The aggregator is the only writer; the pipeline
//! feeds it from a single task.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

use crate::models::{FieldKey, FieldValue, ManufacturerRow, NormalizedRecord, UNSPECIFIED};

/// One row of the basic-info table, values already rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicInfoRow {
    pub file_name: String,
    pub company_name: String,
    pub project_id: String,
    pub location: String,
    pub date: String,
    pub mail_received_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManufacturerTotals {
    pub loose_units: u64,
    pub full_cases: u64,
    pub loose_repeat: u64,
    pub cases_repeat: u64,
}

impl ManufacturerTotals {
    /// Totals saturate at `u64::MAX`.
    fn add(&mut self, row: &ManufacturerRow) {
        let sum = |total: &mut u64, value: Option<u64>| {
            *total = total.saturating_add(value.unwrap_or(0));
        };
        sum(&mut self.loose_units, row.affected_loose_units);
        sum(&mut self.full_cases, row.affected_full_cases);
        sum(&mut self.loose_repeat, row.affected_loose_repeat_batch);
        sum(&mut self.cases_repeat, row.affected_cases_repeat_batch);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManufacturerStatEntry {
    pub canonical: String,
    /// Records naming this manufacturer.
    pub count: usize,
    pub documents: BTreeSet<String>,
    pub totals: ManufacturerTotals,
    pub exponential_rows: usize,
}

impl ManufacturerStatEntry {
    fn new(canonical: &str) -> Self {
        Self {
            canonical: canonical.to_string(),
            count: 0,
            documents: BTreeSet::new(),
            totals: ManufacturerTotals::default(),
            exponential_rows: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerRow {
    pub document: String,
    pub survey_no: Option<String>,
    pub injured_bottler: Option<String>,
    pub location: Option<String>,
    pub mail_received: Option<NaiveDate>,
    pub report_date: Option<NaiveDate>,
}

/// Bucket key: (year of the report date, injured bottler short code).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TrackerKey {
    pub year: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerEntry {
    pub key: TrackerKey,
    /// Rows keyed by document identity.
    pub rows: BTreeMap<String, TrackerRow>,
}

/// One manufacturer line of a document's summary, or a placeholder for a
/// document without a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub manufacturer: Option<String>,
    /// Manufacturer name as printed in the document.
    pub raw_name: Option<String>,
    pub stock_observation_percentage: Option<f64>,
    pub loose_units: Option<u64>,
    pub full_cases: Option<u64>,
    pub loose_repeat: Option<u64>,
    pub cases_repeat: Option<u64>,
    pub total_repeated: u64,
    pub has_exponential: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub document: String,
    pub survey_no: Option<String>,
    pub injured_bottler: Option<String>,
    pub location: Option<String>,
    pub report_date: Option<NaiveDate>,
    pub rows: Vec<SummaryRow>,
}

/// Everything accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateState {
    pub records: usize,
    pub basic_info: BTreeMap<String, BasicInfoRow>,
    pub manufacturers: BTreeMap<String, ManufacturerStatEntry>,
    #[serde(serialize_with = "values_only")]
    pub tracker: BTreeMap<TrackerKey, TrackerEntry>,
    pub summary: BTreeMap<String, SummaryEntry>,
    /// Records missing each expected field.
    pub missing_fields: BTreeMap<FieldKey, usize>,
}

impl AggregateState {
    pub fn manufacturer_count_total(&self) -> usize {
        self.manufacturers.values().map(|m| m.count).sum()
    }

    pub fn tracker_rows(&self) -> usize {
        self.tracker.values().map(|t| t.rows.len()).sum()
    }
}

#[derive(Debug, Default)]
pub struct RecordAggregator {
    state: AggregateState,
}

impl RecordAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: NormalizedRecord) {
        let id = record.relative_path.clone();
        let state = &mut self.state;
        state.records += 1;

        for key in record.classification.expected_fields() {
            if record.field(*key).is_missing() {
                *state.missing_fields.entry(*key).or_insert(0) += 1;
            }
        }

        state.basic_info.insert(
            id.clone(),
            BasicInfoRow {
                file_name: record.document.clone(),
                company_name: record.field(FieldKey::CompanyName).to_string(),
                project_id: record.field(FieldKey::ProjectId).to_string(),
                location: record.field(FieldKey::Location).to_string(),
                date: record.field(FieldKey::ReportDate).to_string(),
                mail_received_date: record.field(FieldKey::MailReceivedDate).to_string(),
            },
        );

        let mut seen = BTreeSet::new();
        for row in &record.manufacturers {
            let entry = state
                .manufacturers
                .entry(row.canonical.clone())
                .or_insert_with(|| ManufacturerStatEntry::new(&row.canonical));
            if seen.insert(row.canonical.clone()) {
                entry.count += 1;
            }
            entry.documents.insert(id.clone());
            entry.totals.add(row);
            if row.has_exponential {
                entry.exponential_rows += 1;
            }
        }
        if record.manufacturers.is_empty() {
            let entry = state
                .manufacturers
                .entry(UNSPECIFIED.to_string())
                .or_insert_with(|| ManufacturerStatEntry::new(UNSPECIFIED));
            entry.count += 1;
            entry.documents.insert(id.clone());
        }

        let survey_no = text(&record, FieldKey::ProjectId);
        let location = text(&record, FieldKey::Location);
        let report_date = record.date(FieldKey::ReportDate);

        let key = TrackerKey {
            year: report_date
                .map(|d| d.year().to_string())
                .unwrap_or_else(|| UNSPECIFIED.to_string()),
            category: record
                .injured_bottler
                .clone()
                .unwrap_or_else(|| UNSPECIFIED.to_string()),
        };
        state
            .tracker
            .entry(key.clone())
            .or_insert_with(|| TrackerEntry {
                key,
                rows: BTreeMap::new(),
            })
            .rows
            .insert(
                id.clone(),
                TrackerRow {
                    document: record.document.clone(),
                    survey_no: survey_no.clone(),
                    injured_bottler: record.injured_bottler.clone(),
                    location: location.clone(),
                    mail_received: record.date(FieldKey::MailReceivedDate),
                    report_date,
                },
            );

        let mut rows: Vec<SummaryRow> = record
            .manufacturers
            .iter()
            .map(|m| SummaryRow {
                manufacturer: Some(m.canonical.clone()),
                raw_name: Some(m.raw_name.clone()),
                stock_observation_percentage: m.stock_observation_percentage,
                loose_units: m.affected_loose_units,
                full_cases: m.affected_full_cases,
                loose_repeat: m.affected_loose_repeat_batch,
                cases_repeat: m.affected_cases_repeat_batch,
                total_repeated: m.total_repeated(),
                has_exponential: m.has_exponential,
            })
            .collect();
        if rows.is_empty() {
            rows.push(SummaryRow {
                manufacturer: None,
                raw_name: None,
                stock_observation_percentage: None,
                loose_units: None,
                full_cases: None,
                loose_repeat: None,
                cases_repeat: None,
                total_repeated: 0,
                has_exponential: false,
            });
        }
        state.summary.insert(
            id,
            SummaryEntry {
                document: record.document,
                survey_no,
                injured_bottler: record.injured_bottler,
                location,
                report_date,
                rows,
            },
        );
    }

    pub fn snapshot(&self) -> &AggregateState {
        &self.state
    }

    pub fn into_state(self) -> AggregateState {
        self.state
    }
}

/// Struct keys are not valid JSON object keys; the entries carry their key.
fn values_only<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_seq(map.values())
}

fn text(record: &NormalizedRecord, key: FieldKey) -> Option<String> {
    match record.field(key) {
        FieldValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}
