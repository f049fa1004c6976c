//! Manufacturer statistics table recognition.
//!
//! The table sits inside the summary section of a report: a header line
//! naming the manufacturer column, then one line per manufacturer with the
//! name followed by its value cells. Text extraction flattens the table, so
//! rows are recovered from the trailing run of value-like tokens on each
//! line. Values are kept as raw strings; numeric parsing happens during
//! normalization.

use crate::config::TableConfig;
use crate::models::{PageText, RawManufacturerRow, SourceLocation, TableColumn};

const SUPERSCRIPTS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹";

/// Wrapped names longer than this are taken to be prose, not a name.
const MAX_NAME_PREFIX_WORDS: usize = 6;

pub struct TableParser {
    config: TableConfig,
}

impl TableParser {
    pub fn new(config: TableConfig) -> Self {
        Self { config }
    }

    /// Rows from every page that carries the summary section, in page order.
    pub fn parse(&self, pages: &[PageText]) -> Vec<RawManufacturerRow> {
        let mut rows = Vec::new();
        for page in pages {
            self.parse_page(page, &mut rows);
        }
        rows
    }

    fn parse_page(&self, page: &PageText, rows: &mut Vec<RawManufacturerRow>) {
        let anchor = self.config.section_anchor.as_str();
        let Some(start) = page.lines.iter().position(|l| l.text.contains(anchor)) else {
            return;
        };
        let header_keyword = self.config.header_keyword.to_lowercase();

        let mut in_table = false;
        let mut seen_row = false;
        let mut pending: Option<String> = None;

        for line in &page.lines[start..] {
            let text = line.text.trim();
            if self
                .config
                .section_end_markers
                .iter()
                .any(|m| text.contains(m.as_str()))
            {
                break;
            }
            if text.to_lowercase().contains(&header_keyword) {
                in_table = true;
                seen_row = false;
                pending = None;
                continue;
            }
            if !in_table || text.is_empty() {
                continue;
            }

            match split_row(text, self.config.columns.len()) {
                Some((name, values)) => {
                    let name = match pending.take() {
                        Some(prefix) => format!("{} {}", prefix, name),
                        None => name.to_string(),
                    };
                    seen_row = true;
                    if self.is_skipped(&name) {
                        continue;
                    }
                    rows.push(RawManufacturerRow {
                        name,
                        cells: self.assign_columns(&values),
                        location: SourceLocation {
                            page: page.index,
                            line: Some(line.number),
                        },
                    });
                }
                None => {
                    let words = text.split_whitespace().count();
                    if pending.is_some() && seen_row {
                        // Two value-less lines in a row: the table is over.
                        in_table = false;
                        pending = None;
                    } else if words <= MAX_NAME_PREFIX_WORDS && !text.ends_with('.') {
                        pending = Some(match pending.take() {
                            Some(p) => format!("{} {}", p, text),
                            None => text.to_string(),
                        });
                    } else if seen_row {
                        in_table = false;
                    }
                }
            }
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.config
            .skip_names
            .iter()
            .any(|s| lower.contains(&s.to_lowercase()))
    }

    /// A `%` token goes to the percentage column; the rest fill the
    /// remaining columns left to right.
    fn assign_columns(&self, values: &[&str]) -> Vec<(TableColumn, String)> {
        let mut cells = Vec::with_capacity(values.len());
        let mut remaining: Vec<TableColumn> = self.config.columns.clone();
        let mut rest = Vec::new();

        for v in values {
            if v.contains('%') {
                if let Some(i) = remaining.iter().position(|c| *c == TableColumn::Percentage) {
                    cells.push((remaining.remove(i), v.to_string()));
                    continue;
                }
            }
            rest.push(*v);
        }
        if rest.len() < remaining.len() && cells.is_empty() {
            // No explicit percentage cell: counts only.
            remaining.retain(|c| *c != TableColumn::Percentage);
        }
        for (column, v) in remaining.into_iter().zip(rest) {
            cells.push((column, v.to_string()));
        }
        cells
    }
}

/// Splits `line` into a name and up to `max_values` trailing value tokens.
fn split_row(line: &str, max_values: usize) -> Option<(&str, Vec<&str>)> {
    let tokens: Vec<(usize, &str)> = token_offsets(line);
    let mut first_value = tokens.len();
    while first_value > 0
        && tokens.len() - first_value < max_values
        && is_value_token(tokens[first_value - 1].1)
    {
        first_value -= 1;
    }
    if first_value == tokens.len() || first_value == 0 {
        return None;
    }
    let name = line[..tokens[first_value].0].trim();
    if !name.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let values = tokens[first_value..].iter().map(|(_, t)| *t).collect();
    Some((name, values))
}

fn token_offsets(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                out.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &line[s..]));
    }
    out
}

pub fn is_value_token(token: &str) -> bool {
    let lower = token.to_lowercase();
    if matches!(lower.as_str(), "-" | "–" | "—" | "n/a" | "na" | "nil") {
        return true;
    }
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '%' | '*') || SUPERSCRIPTS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> PageText {
        PageText::new(0, text)
    }

    fn parser() -> TableParser {
        TableParser::new(TableConfig::default())
    }

    #[test]
    fn value_tokens() {
        assert!(is_value_token("1,204"));
        assert!(is_value_token("12.5%"));
        assert!(is_value_token("3²"));
        assert!(is_value_token("40**2"));
        assert!(is_value_token("-"));
        assert!(!is_value_token("Ltd."));
        assert!(!is_value_token("%"));
    }

    #[test]
    fn parses_rows_inside_summary_section() {
        let text = "Intro text 2023\n\
            Summary of information gathered\n\
            Manufacturer % of outlets Loose units Full cases Loose repeat Cases repeat\n\
            Acme Bottling Co. 25% 1,200 30 4 -\n\
            Beta Drinks Pvt Ltd 10% 50 2 0 0\n\
            Total 35% 1,250 32 4 0\n\
            Annexure A\n\
            Gamma Ltd 5% 1 1 1 1";
        let rows = parser().parse(&[page(text)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Acme Bottling Co.");
        assert_eq!(rows[0].cell(TableColumn::Percentage), Some("25%"));
        assert_eq!(rows[0].cell(TableColumn::LooseUnits), Some("1,200"));
        assert_eq!(rows[0].cell(TableColumn::CasesRepeat), Some("-"));
        assert_eq!(rows[0].location.line, Some(4));
        assert_eq!(rows[1].name, "Beta Drinks Pvt Ltd");
    }

    #[test]
    fn page_without_section_is_ignored() {
        let text = "Manufacturer units\nAcme 1 2 3 4";
        assert!(parser().parse(&[page(text)]).is_empty());
    }

    #[test]
    fn wrapped_name_is_joined() {
        let text = "Summary of information gathered\n\
            Manufacturer %\n\
            Enrich Agro Food Products\n\
            Private Limited 12% 10 1 0 0";
        let rows = parser().parse(&[page(text)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Enrich Agro Food Products Private Limited");
    }

    #[test]
    fn prose_after_table_ends_it() {
        let text = "Summary of information gathered\n\
            Manufacturer %\n\
            Acme 12% 10 1 0 0\n\
            We note the following observations\n\
            about the market\n\
            in the year 2023";
        let rows = parser().parse(&[page(text)]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn rows_without_percentage_fill_count_columns() {
        let text = "Summary of information gathered\nManufacturer\nAcme 7 3";
        let rows = parser().parse(&[page(text)]);
        assert_eq!(rows[0].cell(TableColumn::LooseUnits), Some("7"));
        assert_eq!(rows[0].cell(TableColumn::FullCases), Some("3"));
        assert_eq!(rows[0].cell(TableColumn::Percentage), None);
    }
}
