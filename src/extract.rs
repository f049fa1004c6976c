//! Field extraction for one document.
//!
//! Applies the compiled [`RuleSet`] to a [`SourceDocument`]: for each field
//! known for the document's classification, rules are tried in priority
//! order and the first rule with a hit wins. Extraction never fails; misses
//! and conflicts become explicit markers and diagnostics, and a document
//! that yields none of its required fields is reported as unclassified.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Stage};
use crate::models::{
    Classification, ExtractedField, FieldKey, RawManufacturerRow, SourceDocument,
};
use crate::rules::{scoped_segments, MatchContext, RuleSet};
use crate::table::TableParser;

/// Everything pulled out of one document, before normalization.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub document: String,
    pub relative_path: String,
    pub classification: Classification,
    pub fields: Vec<ExtractedField>,
    pub manufacturer_rows: Vec<RawManufacturerRow>,
    /// Number of required fields for this classification that were found.
    pub required_found: usize,
    pub required_total: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    pub fn field(&self, key: FieldKey) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn raw(&self, key: FieldKey) -> Option<&str> {
        self.field(key).and_then(|f| f.raw.as_deref())
    }

    /// A document is usable when its name was recognized and at least one
    /// required field was found.
    pub fn is_classified(&self) -> bool {
        self.classification.is_recognized() && self.required_found > 0
    }

    pub fn classification_failure(&self) -> Option<String> {
        if !self.classification.is_recognized() {
            Some("file name matches neither 'Draft Report' nor 'Draft Findings'".to_string())
        } else if self.required_found == 0 {
            Some(format!(
                "none of the {} required fields recognized",
                self.required_total
            ))
        } else {
            None
        }
    }
}

pub struct FieldExtractor {
    rules: RuleSet,
    table: TableParser,
}

impl FieldExtractor {
    pub fn new(rules: RuleSet, table: TableParser) -> Self {
        Self { rules, table }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = RuleSet::compile(&config.effective_rules())?;
        Ok(Self::new(rules, TableParser::new(config.table.clone())))
    }

    pub fn extract(&self, doc: &SourceDocument) -> Extraction {
        let classification = doc.classification;
        let ctx = MatchContext {
            file_name: &doc.name,
        };
        let required = self.rules.required_fields(classification);
        let mut fields = Vec::new();
        let mut diagnostics = Vec::new();
        let mut required_found = 0usize;

        for key in self.rules.fields(classification) {
            let mut winner = None;
            for rule in self.rules.rules_for(classification, key) {
                let segments = scoped_segments(&doc.pages, &rule.scope);
                let hits = rule.matcher.find(&segments, &ctx);
                let Some(first) = hits.first() else {
                    continue;
                };
                if let Some(other) = hits.iter().find(|h| h.value != first.value) {
                    diagnostics.push(Diagnostic::warning(
                        &doc.name,
                        Stage::Extract,
                        format!(
                            "{}: conflicting values '{}' and '{}' from {}; keeping the first",
                            key,
                            first.value,
                            other.value,
                            rule.matcher.describe()
                        ),
                    ));
                }
                winner = Some(ExtractedField::found(key, first.value.clone(), first.location));
                break;
            }

            match winner {
                Some(field) => {
                    if required.contains(&key) {
                        required_found += 1;
                    }
                    fields.push(field);
                }
                None if required.contains(&key) => {
                    diagnostics.push(Diagnostic::warning(
                        &doc.name,
                        Stage::Extract,
                        format!("required field {} not found", key),
                    ));
                    fields.push(ExtractedField::missing(key));
                }
                None => {}
            }
        }

        let manufacturer_rows = if classification.is_recognized() {
            self.table.parse(&doc.pages)
        } else {
            Vec::new()
        };

        Extraction {
            document: doc.name.clone(),
            relative_path: doc.relative_path.clone(),
            classification,
            fields,
            manufacturer_rows,
            required_found,
            required_total: required.len(),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::models::PageText;

    fn doc(name: &str, pages: &[&str]) -> SourceDocument {
        SourceDocument {
            name: name.to_string(),
            relative_path: name.to_string(),
            classification: Classification::from_file_name(name),
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, t)| PageText::new(i, *t))
                .collect(),
        }
    }

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(RuleSet::defaults(), TableParser::new(TableConfig::default()))
    }

    const REPORT_PAGE: &str = "Confidential\n\
        Moon Beverages Limited\n\
        Project Stellar\n\
        Project ID: KB204, North Delhi\n\
        Report date 12 March 2023";

    #[test]
    fn report_fields_found() {
        let ex = extractor().extract(&doc("KB204 Draft Report.pdf", &[REPORT_PAGE]));
        assert!(ex.is_classified());
        assert_eq!(ex.raw(FieldKey::CompanyName), Some("Moon Beverages Limited"));
        assert_eq!(ex.raw(FieldKey::ProjectId), Some("KB204"));
        assert_eq!(ex.raw(FieldKey::Location), Some("North Delhi"));
        assert_eq!(ex.raw(FieldKey::ReportDate), Some("12 March 2023"));
        assert_eq!(ex.field(FieldKey::CompanyName).unwrap().location.unwrap().line, Some(2));
    }

    #[test]
    fn findings_fields_found() {
        let page = "Draft Findings\n\
            Survey ID: SR1042\n\
            Requestor: SLMG Beverages Private Limited\n\
            Lucknow, Uttar Pradesh\n\
            Date: 2023-06-01";
        let ex = extractor().extract(&doc("SR1042 Draft Findings.pdf", &[page]));
        assert!(ex.is_classified());
        assert_eq!(ex.raw(FieldKey::SurveyId), Some("SR1042"));
        assert_eq!(ex.raw(FieldKey::ProjectId), Some("SR1042"));
        assert_eq!(ex.raw(FieldKey::Requestor), Some("SLMG Beverages Private Limited"));
        assert_eq!(ex.raw(FieldKey::CompanyName), Some("SLMG Beverages Private Limited"));
        assert_eq!(ex.raw(FieldKey::Location), Some("Lucknow"));
        assert_eq!(ex.raw(FieldKey::ReportDate), Some("2023-06-01"));
    }

    #[test]
    fn missing_required_field_is_marked() {
        let page = "Confidential\nMoon Beverages Limited\nProject Stellar\nno ids here";
        let ex = extractor().extract(&doc("Draft Report.pdf", &[page]));
        let project = ex.field(FieldKey::ProjectId).unwrap();
        assert!(project.is_missing());
        assert!(ex
            .diagnostics
            .iter()
            .any(|d| d.message.contains("project_id not found")));
        assert!(ex.is_classified());
    }

    #[test]
    fn conflicting_values_keep_first_and_warn() {
        let page = format!("{}\nsigned 14 April 2023", REPORT_PAGE);
        let ex = extractor().extract(&doc("KB204 Draft Report.pdf", &[&page]));
        assert_eq!(ex.raw(FieldKey::ReportDate), Some("12 March 2023"));
        assert!(ex
            .diagnostics
            .iter()
            .any(|d| d.message.contains("conflicting values")));
    }

    #[test]
    fn nothing_recognized_fails_classification() {
        let ex = extractor().extract(&doc("Draft Report x.pdf", &["lorem ipsum"]));
        assert!(!ex.is_classified());
        assert!(ex.classification_failure().unwrap().contains("required"));
    }

    #[test]
    fn unrecognized_name_fails_classification() {
        let ex = extractor().extract(&doc("summary.pdf", &[REPORT_PAGE]));
        assert!(ex.fields.is_empty());
        assert!(!ex.is_classified());
    }
}
