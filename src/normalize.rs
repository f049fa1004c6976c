//! Normalization of extracted values.
//!
//! Turns an [`Extraction`] into a [`NormalizedRecord`]: dates are parsed
//! into [`NaiveDate`], text is trimmed, manufacturer names are collapsed to
//! a canonical form through the configured alias table, and table cells are
//! parsed into counts. Nothing here touches the filesystem and nothing
//! panics on malformed input; values that cannot be parsed become
//! [`FieldValue::Missing`] with the original text kept.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::AliasConfig;
use crate::diagnostics::{Diagnostic, Stage};
use crate::extract::Extraction;
use crate::models::{
    Classification, FieldKey, FieldValue, ManufacturerRow, NormalizedRecord, RawManufacturerRow,
    TableColumn,
};

const SUPERSCRIPTS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹";

lazy_static! {
    static ref RE_ORDINAL: Regex = Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap();
    static ref RE_SEPT: Regex = Regex::new(r"(?i)\bsept\b").unwrap();
}

/// Formats tried in order. Numeric forms are day-first unless the year leads.
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d %B %Y",
    "%d-%B-%Y",
    "%d/%B/%Y",
    "%B %d %Y",
];

/// Lookup tables built once per run from `[aliases]`.
#[derive(Debug, Clone, Default)]
pub struct AliasTables {
    /// Normalized variant key → canonical manufacturer name.
    manufacturers: HashMap<String, String>,
    /// Lowercased full bottler name → short code, longest name first.
    bottlers: Vec<(String, String)>,
    /// Distinct short codes, longest first.
    short_codes: Vec<String>,
}

impl AliasTables {
    pub fn from_config(config: &AliasConfig) -> Self {
        let mut manufacturers = HashMap::new();
        for (canonical, variants) in &config.manufacturers {
            manufacturers.insert(manufacturer_key(canonical), canonical.clone());
            for variant in variants {
                manufacturers.insert(manufacturer_key(variant), canonical.clone());
            }
        }

        let mut bottlers: Vec<(String, String)> = config
            .bottlers
            .iter()
            .map(|(full, short)| (collapse_whitespace(full).to_lowercase(), short.clone()))
            .collect();
        bottlers.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut short_codes: Vec<String> = config.bottlers.values().cloned().collect();
        short_codes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        short_codes.dedup();

        Self {
            manufacturers,
            bottlers,
            short_codes,
        }
    }

    /// Canonical display name for a manufacturer as written in a document.
    pub fn canonical_manufacturer(&self, raw: &str) -> String {
        let key = manufacturer_key(raw);
        match self.manufacturers.get(&key) {
            Some(canonical) => canonical.clone(),
            None => title_case(&key),
        }
    }

    /// Short code of the bottler named in `company`, else a short code
    /// contained in `project_id`.
    pub fn bottler_code(&self, company: Option<&str>, project_id: Option<&str>) -> Option<String> {
        if let Some(company) = company {
            let company = collapse_whitespace(company).to_lowercase();
            if let Some((_, short)) = self
                .bottlers
                .iter()
                .find(|(full, _)| company.contains(full.as_str()))
            {
                return Some(short.clone());
            }
        }
        let project_id = project_id?;
        self.short_codes
            .iter()
            .find(|code| !code.is_empty() && project_id.contains(code.as_str()))
            .cloned()
    }
}

/// Result of normalizing one document.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: NormalizedRecord,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn normalize(extraction: &Extraction, aliases: &AliasTables) -> Normalized {
    let doc = extraction.document.as_str();
    let mut diagnostics = Vec::new();
    let mut fields = BTreeMap::new();

    for key in FieldKey::ALL {
        let value = match extraction.raw(key) {
            None => FieldValue::Missing { raw: None },
            Some(raw) if key.is_date() => match parse_date(raw) {
                Some(date) => FieldValue::Date(date),
                None => {
                    diagnostics.push(Diagnostic::warning(
                        doc,
                        Stage::Normalize,
                        format!("{}: unparseable date '{}'", key, raw.trim()),
                    ));
                    FieldValue::Missing {
                        raw: Some(raw.to_string()),
                    }
                }
            },
            Some(raw) => match clean_text(key, raw) {
                Some(text) => FieldValue::Text(text),
                None => FieldValue::Missing {
                    raw: Some(raw.to_string()),
                },
            },
        };
        fields.insert(key, value);
    }

    if extraction.classification == Classification::DraftFindings {
        fill_from(&mut fields, FieldKey::ProjectId, FieldKey::SurveyId);
        fill_from(&mut fields, FieldKey::CompanyName, FieldKey::Requestor);
    }

    let manufacturers = extraction
        .manufacturer_rows
        .iter()
        .map(|row| normalize_row(row, aliases))
        .collect();

    let injured_bottler = aliases.bottler_code(
        fields.get(&FieldKey::CompanyName).and_then(FieldValue::as_text),
        fields.get(&FieldKey::ProjectId).and_then(FieldValue::as_text),
    );

    Normalized {
        record: NormalizedRecord {
            document: extraction.document.clone(),
            relative_path: extraction.relative_path.clone(),
            classification: extraction.classification,
            fields,
            manufacturers,
            injured_bottler,
        },
        diagnostics,
    }
}

fn fill_from(fields: &mut BTreeMap<FieldKey, FieldValue>, target: FieldKey, source: FieldKey) {
    let target_missing = fields.get(&target).map_or(true, FieldValue::is_missing);
    if !target_missing {
        return;
    }
    if let Some(value @ FieldValue::Text(_)) = fields.get(&source).cloned() {
        fields.insert(target, value);
    }
}

fn clean_text(key: FieldKey, raw: &str) -> Option<String> {
    let text = match key {
        FieldKey::CompanyName => raw
            .lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        FieldKey::Location => collapse_whitespace(&raw.replace('_', " ")),
        _ => collapse_whitespace(raw),
    };
    (!text.is_empty()).then_some(text)
}

fn normalize_row(row: &RawManufacturerRow, aliases: &AliasTables) -> ManufacturerRow {
    let mut has_exponential = false;
    let mut count = |column: TableColumn| {
        let Some(cell) = row.cell(column) else {
            return None;
        };
        let (value, exp) = parse_count(cell);
        has_exponential |= exp || (is_repeat_column(column) && cell.trim().ends_with('6'));
        value
    };
    let affected_loose_units = count(TableColumn::LooseUnits);
    let affected_full_cases = count(TableColumn::FullCases);
    let affected_loose_repeat_batch = count(TableColumn::LooseRepeat);
    let affected_cases_repeat_batch = count(TableColumn::CasesRepeat);

    ManufacturerRow {
        raw_name: row.name.clone(),
        canonical: aliases.canonical_manufacturer(&row.name),
        stock_observation_percentage: row.cell(TableColumn::Percentage).and_then(parse_percentage),
        affected_loose_units,
        affected_full_cases,
        affected_loose_repeat_batch,
        affected_cases_repeat_batch,
        has_exponential,
    }
}

fn is_repeat_column(column: TableColumn) -> bool {
    matches!(column, TableColumn::LooseRepeat | TableColumn::CasesRepeat)
}

/// Parses a date in any of the accepted layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.replace(',', " ");
    let cleaned = RE_ORDINAL.replace_all(&cleaned, "$1");
    let cleaned = RE_SEPT.replace_all(&cleaned, "Sep");
    let cleaned = collapse_whitespace(&cleaned);
    if cleaned.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
        .find(|d| (1900..=2100).contains(&d.year()))
}

/// Parses a count cell. The flag is set when the cell used superscript or
/// `**` exponent notation, in which case only the base is kept.
pub fn parse_count(raw: &str) -> (Option<u64>, bool) {
    let token = raw.trim();
    if matches!(token, "-" | "–" | "—") {
        return (Some(0), false);
    }
    let cut = token
        .char_indices()
        .find(|(i, c)| SUPERSCRIPTS.contains(*c) || token[*i..].starts_with("**"))
        .map(|(i, _)| i);
    let (base, exponential) = match cut {
        Some(i) => (&token[..i], true),
        None => (token, false),
    };
    if !token.chars().any(|c| c.is_ascii_digit() || SUPERSCRIPTS.contains(c)) {
        return (None, exponential);
    }
    let digits: String = base
        .chars()
        .take_while(|c| *c != '.')
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return (Some(0), exponential);
    }
    (digits.parse().ok(), exponential)
}

pub fn parse_percentage(raw: &str) -> Option<f64> {
    let number: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// Lowercase, punctuation replaced by spaces, whitespace collapsed.
pub fn manufacturer_key(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&replaced).to_lowercase()
}

fn title_case(key: &str) -> String {
    key.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedField, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation { page: 0, line: Some(1) }
    }

    fn extraction(classification: Classification, fields: &[(FieldKey, &str)]) -> Extraction {
        Extraction {
            document: "doc.pdf".into(),
            relative_path: "doc.pdf".into(),
            classification,
            fields: fields
                .iter()
                .map(|(k, v)| ExtractedField::found(*k, *v, loc()))
                .collect(),
            manufacturer_rows: Vec::new(),
            required_found: fields.len(),
            required_total: fields.len(),
            diagnostics: Vec::new(),
        }
    }

    fn tables() -> AliasTables {
        let mut config = AliasConfig::default();
        config.manufacturers.insert(
            "Acme Corporation".into(),
            vec!["ACME Corp.".into(), "Acme Co".into()],
        );
        AliasTables::from_config(&config)
    }

    #[test]
    fn date_layouts_agree() {
        let expected = NaiveDate::from_ymd_opt(2023, 4, 5).unwrap();
        for raw in [
            "2023/04/05",
            "05-04-2023",
            "5 April 2023",
            "5th April, 2023",
            "05-Apr-2023",
            "April 5, 2023",
            "5.4.2023",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{}", raw);
        }
        assert_eq!(parse_date("12 Sept 2022"), NaiveDate::from_ymd_opt(2022, 9, 12));
        assert_eq!(parse_date("sometime in spring"), None);
        assert_eq!(parse_date("31-02-2023"), None);
    }

    #[test]
    fn manufacturer_variants_collapse() {
        let t = AliasTables::from_config(&AliasConfig::default());
        let a = t.canonical_manufacturer("ACME Corp.");
        let b = t.canonical_manufacturer("acme  corp");
        let c = t.canonical_manufacturer("Acme Corp");
        assert_eq!(a, "Acme Corp");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn configured_aliases_win() {
        let t = tables();
        assert_eq!(t.canonical_manufacturer("acme co."), "Acme Corporation");
        assert_eq!(t.canonical_manufacturer("ACME CORP"), "Acme Corporation");
        assert_eq!(t.canonical_manufacturer("Zeta Ltd"), "Zeta Ltd");
    }

    #[test]
    fn counts_handle_markers() {
        assert_eq!(parse_count("1,204"), (Some(1204), false));
        assert_eq!(parse_count("-"), (Some(0), false));
        assert_eq!(parse_count("40²"), (Some(40), true));
        assert_eq!(parse_count("3**2"), (Some(3), true));
        assert_eq!(parse_count("n/a"), (None, false));
        assert_eq!(parse_percentage("12.5%"), Some(12.5));
        assert_eq!(parse_percentage("none"), None);
    }

    #[test]
    fn bottler_code_from_company_then_project() {
        let t = AliasTables::from_config(&AliasConfig::default());
        assert_eq!(
            t.bottler_code(Some("Kandhari Global Beverages\nPrivate Limited"), None),
            Some("KGB".into())
        );
        assert_eq!(t.bottler_code(Some("Unknown Co"), Some("HCCB-2023-7")), Some("HCCB".into()));
        assert_eq!(t.bottler_code(None, None), None);
    }

    #[test]
    fn every_field_key_present() {
        let ex = extraction(Classification::DraftReport, &[(FieldKey::ProjectId, "KB204")]);
        let n = normalize(&ex, &tables());
        assert_eq!(n.record.fields.len(), FieldKey::ALL.len());
        assert_eq!(n.record.text(FieldKey::ProjectId), Some("KB204"));
        assert!(n.record.field(FieldKey::Location).is_missing());
    }

    #[test]
    fn bad_date_becomes_missing_with_raw() {
        let ex = extraction(Classification::DraftReport, &[(FieldKey::ReportDate, "soon")]);
        let n = normalize(&ex, &tables());
        assert_eq!(
            n.record.field(FieldKey::ReportDate),
            &FieldValue::Missing { raw: Some("soon".into()) }
        );
        assert_eq!(n.diagnostics.len(), 1);
    }

    #[test]
    fn findings_fall_back_to_survey_and_requestor() {
        let ex = extraction(
            Classification::DraftFindings,
            &[
                (FieldKey::SurveyId, "SR1042"),
                (FieldKey::Requestor, "SLMG Beverages Private Limited"),
                (FieldKey::Location, "North_Delhi"),
            ],
        );
        let n = normalize(&ex, &tables());
        assert_eq!(n.record.text(FieldKey::ProjectId), Some("SR1042"));
        assert_eq!(n.record.text(FieldKey::CompanyName), Some("SLMG Beverages Private Limited"));
        assert_eq!(n.record.text(FieldKey::Location), Some("North Delhi"));
        assert_eq!(n.record.injured_bottler.as_deref(), Some("SLMG"));
    }

    #[test]
    fn rows_are_parsed_and_flagged() {
        let mut ex = extraction(Classification::DraftReport, &[]);
        ex.manufacturer_rows.push(RawManufacturerRow {
            name: "ACME Corp.".into(),
            cells: vec![
                (TableColumn::Percentage, "25%".into()),
                (TableColumn::LooseUnits, "1,200".into()),
                (TableColumn::FullCases, "3²".into()),
                (TableColumn::LooseRepeat, "4".into()),
                (TableColumn::CasesRepeat, "-".into()),
            ],
            location: loc(),
        });
        let n = normalize(&ex, &tables());
        let row = &n.record.manufacturers[0];
        assert_eq!(row.canonical, "Acme Corporation");
        assert_eq!(row.stock_observation_percentage, Some(25.0));
        assert_eq!(row.affected_loose_units, Some(1200));
        assert_eq!(row.affected_full_cases, Some(3));
        assert!(row.has_exponential);
        assert_eq!(row.total_repeated(), 4);
    }

    #[test]
    fn scaffolded_config_resolves_every_bottler() {
        use crate::config::{Config, EXAMPLE_CONFIG};

        let builtin = Config::minimal();
        let scaffolded: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
        let builtin_tables = AliasTables::from_config(&builtin.aliases);
        let scaffolded_tables = AliasTables::from_config(&scaffolded.aliases);
        for full_name in builtin.aliases.bottlers.keys() {
            let expected = builtin_tables.bottler_code(Some(full_name.as_str()), None);
            assert!(expected.is_some(), "{} has no code", full_name);
            assert_eq!(scaffolded_tables.bottler_code(Some(full_name.as_str()), None), expected);
        }
        assert_eq!(
            scaffolded_tables.canonical_manufacturer("ACME Corporation"),
            "Acme Corporation"
        );
    }

    fn repeat_row(loose_units: &str, loose_repeat: &str) -> RawManufacturerRow {
        RawManufacturerRow {
            name: "Beta Drinks".into(),
            cells: vec![
                (TableColumn::LooseUnits, loose_units.into()),
                (TableColumn::LooseRepeat, loose_repeat.into()),
            ],
            location: loc(),
        }
    }

    #[test]
    fn repeat_value_ending_in_six_is_flagged() {
        let mut ex = extraction(Classification::DraftReport, &[]);
        ex.manufacturer_rows.push(repeat_row("12", "26"));
        let n = normalize(&ex, &tables());
        let row = &n.record.manufacturers[0];
        assert_eq!(row.affected_loose_repeat_batch, Some(26));
        assert!(row.has_exponential);
    }

    #[test]
    fn non_repeat_value_ending_in_six_is_not_flagged() {
        let mut ex = extraction(Classification::DraftReport, &[]);
        ex.manufacturer_rows.push(repeat_row("16", "2"));
        let n = normalize(&ex, &tables());
        assert!(!n.record.manufacturers[0].has_exponential);
    }
}
