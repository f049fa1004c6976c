//! Recognition rules for field extraction.
//!
//! A rule pairs a [`FieldKey`] with a locator strategy and a page scope.
//! Locators are compiled into [`FieldMatcher`] objects; the extractor walks
//! the rules of a field in priority order and stops at the first that
//! produces a value.
//!
//! ```text
//! RuleConfig (TOML / defaults)
//!        │ compile
//!        ▼
//!  CompiledRule { field, scope, matcher: Box<dyn FieldMatcher> }
//!        │ find(segments)
//!        ▼
//!  Vec<Hit>  (document order)
//! ```

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

use crate::config::{LocatorConfig, PageScope, RuleConfig, ScopeConfig};
use crate::models::{Classification, FieldKey, PageText, SourceLocation};

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";
const MONTHS_SHORT: &str = "Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec";
const STATES: &str =
    r"(?:Uttar|Madhya|Andhra|Himachal|Arunachal)[ \t]+Pradesh|UP|Bihar|Maharashtra|Karnataka";
const CITIES: &str = r"(?:West|East|North|South|Central)\s+Delhi|Delhi|Mumbai|Kolkata|Bangalore|Hyderabad";

/// A value found by a matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub value: String,
    pub location: SourceLocation,
}

/// Contiguous scoped text from one page.
#[derive(Debug, Clone)]
pub struct Segment {
    pub page: usize,
    /// Line number of the first line in `text`.
    pub first_line: usize,
    pub text: String,
}

impl Segment {
    fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.text
            .lines()
            .enumerate()
            .map(move |(i, l)| (self.first_line + i, l))
    }

    fn location_of(&self, byte_offset: usize) -> SourceLocation {
        let newlines = self.text[..byte_offset].matches('\n').count();
        SourceLocation {
            page: self.page,
            line: Some(self.first_line + newlines),
        }
    }
}

/// What a matcher may look at besides the page text.
pub struct MatchContext<'a> {
    pub file_name: &'a str,
}

/// One locator strategy.
pub trait FieldMatcher: Send + Sync {
    /// Short human-readable form, used in diagnostics.
    fn describe(&self) -> String;

    /// All candidate values, in document order.
    fn find(&self, segments: &[Segment], ctx: &MatchContext<'_>) -> Vec<Hit>;
}

pub struct LabelMatcher {
    label: String,
}

impl FieldMatcher for LabelMatcher {
    fn describe(&self) -> String {
        format!("label '{}'", self.label)
    }

    fn find(&self, segments: &[Segment], _ctx: &MatchContext<'_>) -> Vec<Hit> {
        let mut hits = Vec::new();
        for seg in segments {
            let lines: Vec<(usize, &str)> = seg.lines().collect();
            for (idx, (number, line)) in lines.iter().enumerate() {
                let Some(pos) = line.find(&self.label) else {
                    continue;
                };
                let rest = line[pos + self.label.len()..]
                    .trim_start_matches(':')
                    .trim();
                let found = if rest.is_empty() {
                    lines[idx + 1..]
                        .iter()
                        .find(|(_, l)| !l.trim().is_empty())
                        .map(|(n, l)| (*n, l.trim()))
                } else {
                    Some((*number, rest))
                };
                if let Some((n, value)) = found {
                    hits.push(Hit {
                        value: value.to_string(),
                        location: SourceLocation {
                            page: seg.page,
                            line: Some(n),
                        },
                    });
                }
            }
        }
        hits
    }
}

pub struct RegexMatcher {
    regex: Regex,
    group: usize,
    must_appear_in_filename: bool,
}

impl FieldMatcher for RegexMatcher {
    fn describe(&self) -> String {
        format!("regex /{}/", self.regex.as_str())
    }

    fn find(&self, segments: &[Segment], ctx: &MatchContext<'_>) -> Vec<Hit> {
        let mut hits = Vec::new();
        for seg in segments {
            for caps in self.regex.captures_iter(&seg.text) {
                let Some(m) = caps.get(self.group) else {
                    continue;
                };
                let value = m.as_str().trim();
                if value.is_empty() {
                    continue;
                }
                if self.must_appear_in_filename && !ctx.file_name.contains(value) {
                    continue;
                }
                hits.push(Hit {
                    value: value.to_string(),
                    location: seg.location_of(m.start()),
                });
            }
        }
        hits
    }
}

pub struct LinesBeforeMatcher {
    anchor: String,
    count: usize,
    exclude: Vec<String>,
}

impl FieldMatcher for LinesBeforeMatcher {
    fn describe(&self) -> String {
        format!("{} lines before '{}'", self.count, self.anchor)
    }

    fn find(&self, segments: &[Segment], _ctx: &MatchContext<'_>) -> Vec<Hit> {
        for seg in segments {
            let lines: Vec<(usize, &str)> = seg.lines().collect();
            let Some(anchor_idx) = lines.iter().position(|(_, l)| l.contains(&self.anchor)) else {
                continue;
            };
            if anchor_idx == 0 {
                continue;
            }
            let start = anchor_idx.saturating_sub(self.count);
            let kept: Vec<(usize, &str)> = lines[start..anchor_idx]
                .iter()
                .map(|(n, l)| (*n, l.trim()))
                .filter(|(_, l)| !l.is_empty())
                .filter(|(_, l)| {
                    let lower = l.to_lowercase();
                    !self.exclude.iter().any(|x| lower.contains(x.as_str()))
                })
                .collect();
            if let Some((first_line, _)) = kept.first() {
                let value = kept.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
                return vec![Hit {
                    value,
                    location: SourceLocation {
                        page: seg.page,
                        line: Some(*first_line),
                    },
                }];
            }
        }
        Vec::new()
    }
}

pub struct FilenameMatcher {
    regex: Regex,
    group: usize,
}

impl FieldMatcher for FilenameMatcher {
    fn describe(&self) -> String {
        format!("file name /{}/", self.regex.as_str())
    }

    fn find(&self, _segments: &[Segment], ctx: &MatchContext<'_>) -> Vec<Hit> {
        self.regex
            .captures_iter(ctx.file_name)
            .filter_map(|caps| caps.get(self.group))
            .map(|m| Hit {
                value: m.as_str().to_string(),
                location: SourceLocation {
                    page: 0,
                    line: None,
                },
            })
            .collect()
    }
}

pub struct CompiledRule {
    pub field: FieldKey,
    pub applies_to: Vec<Classification>,
    pub required: bool,
    pub scope: ScopeConfig,
    pub matcher: Box<dyn FieldMatcher>,
}

impl CompiledRule {
    pub fn applies(&self, classification: Classification) -> bool {
        classification.is_recognized()
            && (self.applies_to.is_empty() || self.applies_to.contains(&classification))
    }
}

/// Ordered, compiled rules.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self> {
        let mut indexed: Vec<(usize, &RuleConfig)> = configs.iter().enumerate().collect();
        // Stable: prioritized rules first by priority, then declaration order.
        indexed.sort_by_key(|(i, r)| (r.priority.unwrap_or(u32::MAX), *i));

        let mut rules = Vec::with_capacity(configs.len());
        for (i, cfg) in indexed {
            let matcher = compile_locator(&cfg.locator)
                .with_context(|| format!("rule #{} for field '{}'", i + 1, cfg.field))?;
            rules.push(CompiledRule {
                field: cfg.field,
                applies_to: cfg.applies_to.clone(),
                required: cfg.required,
                scope: cfg.scope.clone(),
                matcher,
            });
        }
        Ok(Self { rules })
    }

    pub fn defaults() -> Self {
        // Default patterns are fixed strings; a failure here is a programming error
        // caught by the unit tests below.
        Self::compile(&default_rules()).unwrap_or(Self { rules: Vec::new() })
    }

    /// Rules for one field and classification, in priority order.
    pub fn rules_for(
        &self,
        classification: Classification,
        field: FieldKey,
    ) -> impl Iterator<Item = &CompiledRule> {
        self.rules
            .iter()
            .filter(move |r| r.field == field && r.applies(classification))
    }

    /// Fields that have at least one rule for this classification.
    pub fn fields(&self, classification: Classification) -> BTreeSet<FieldKey> {
        self.rules
            .iter()
            .filter(|r| r.applies(classification))
            .map(|r| r.field)
            .collect()
    }

    pub fn required_fields(&self, classification: Classification) -> BTreeSet<FieldKey> {
        self.rules
            .iter()
            .filter(|r| r.required && r.applies(classification))
            .map(|r| r.field)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn build_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .with_context(|| format!("invalid pattern: {}", pattern))
}

fn compile_locator(locator: &LocatorConfig) -> Result<Box<dyn FieldMatcher>> {
    Ok(match locator {
        LocatorConfig::Label { label } => Box::new(LabelMatcher {
            label: label.clone(),
        }),
        LocatorConfig::Regex {
            pattern,
            group,
            case_insensitive,
            must_appear_in_filename,
        } => Box::new(RegexMatcher {
            regex: build_regex(pattern, *case_insensitive)?,
            group: *group,
            must_appear_in_filename: *must_appear_in_filename,
        }),
        LocatorConfig::LinesBefore {
            anchor,
            count,
            exclude,
        } => Box::new(LinesBeforeMatcher {
            anchor: anchor.clone(),
            count: *count,
            exclude: exclude.iter().map(|x| x.to_lowercase()).collect(),
        }),
        LocatorConfig::Filename { pattern, group } => Box::new(FilenameMatcher {
            regex: build_regex(pattern, false)?,
            group: *group,
        }),
    })
}

/// Cuts the pages down to the text a rule may search.
pub fn scoped_segments(pages: &[PageText], scope: &ScopeConfig) -> Vec<Segment> {
    let take = match scope.pages {
        PageScope::First => 1,
        PageScope::Leading(n) => n,
        PageScope::All => pages.len(),
    };

    let mut segments = Vec::new();
    for page in pages.iter().take(take) {
        let start = match &scope.after {
            Some(anchor) => match page.lines.iter().position(|l| l.text.contains(anchor.as_str())) {
                Some(idx) => idx,
                None => continue,
            },
            None => 0,
        };
        let end = page.lines[start..]
            .iter()
            .skip(1)
            .position(|l| scope.until.iter().any(|m| l.text.contains(m.as_str())))
            .map(|p| start + 1 + p)
            .unwrap_or(page.lines.len());
        if start >= end {
            continue;
        }
        let text = page.lines[start..end]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(Segment {
            page: page.index,
            first_line: page.lines[start].number,
            text,
        });
    }
    segments
}

fn regex_rule(
    field: FieldKey,
    applies_to: &[Classification],
    required: bool,
    scope: ScopeConfig,
    pattern: String,
) -> RuleConfig {
    RuleConfig {
        field,
        applies_to: applies_to.to_vec(),
        required,
        priority: None,
        scope,
        locator: LocatorConfig::Regex {
            pattern,
            group: 1,
            case_insensitive: false,
            must_appear_in_filename: false,
        },
    }
}

/// The built-in rule set, matching the report and findings layouts this
/// tool was built against.
pub fn default_rules() -> Vec<RuleConfig> {
    use Classification::{DraftFindings, DraftReport};

    let both: &[Classification] = &[];
    let first_page = ScopeConfig::default();
    let summary = ScopeConfig {
        pages: PageScope::Leading(3),
        after: Some("Summary of information gathered".to_string()),
        until: vec!["Annexure".to_string(), "Exhibit".to_string()],
    };
    let word_date = format!(r"\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{}),?\s+\d{{4}}", MONTHS);

    let mut rules = vec![
        // Company: report cover block above the project title.
        RuleConfig {
            field: FieldKey::CompanyName,
            applies_to: vec![DraftReport],
            required: true,
            priority: None,
            scope: first_page.clone(),
            locator: LocatorConfig::LinesBefore {
                anchor: "Project Stellar".to_string(),
                count: 3,
                exclude: vec![
                    "confidential".to_string(),
                    "draft report".to_string(),
                    "report".to_string(),
                ],
            },
        },
    ];

    for field in [FieldKey::Requestor, FieldKey::CompanyName] {
        for label in ["Requestor:", "Requestor"] {
            rules.push(RuleConfig {
                field,
                applies_to: vec![DraftFindings],
                required: field == FieldKey::CompanyName,
                priority: None,
                scope: first_page.clone(),
                locator: LocatorConfig::Label {
                    label: label.to_string(),
                },
            });
        }
    }

    for field in [FieldKey::SurveyId, FieldKey::ProjectId] {
        rules.push(regex_rule(
            field,
            &[DraftFindings],
            true,
            first_page.clone(),
            r"Survey ID[^\n]*?\b([A-Z]{2}\d{3,4})\b".to_string(),
        ));
    }

    for pattern in [
        r"(?:Project|ID|No|Number):\s*([A-Z]+\d+(?:\.[A-Z]\d*)?)",
        r"(?:Project|ID|No|Number)\s+([A-Z]+\d+(?:\.[A-Z]\d*)?)",
        r"\b([A-Z]{2,5}\d{2,5}(?:\.[A-Z]\d*)?)",
    ] {
        rules.push(RuleConfig {
            field: FieldKey::ProjectId,
            applies_to: vec![DraftReport],
            required: true,
            priority: None,
            scope: first_page.clone(),
            locator: LocatorConfig::Regex {
                pattern: pattern.to_string(),
                group: 1,
                case_insensitive: false,
                must_appear_in_filename: true,
            },
        });
    }

    rules.push(regex_rule(
        FieldKey::Location,
        &[DraftReport],
        false,
        first_page.clone(),
        r"(?:Project|ID)[^,\n]*,\s*((?:West|East|North|South|Central)\s+Delhi|[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*)"
            .to_string(),
    ));
    rules.push(RuleConfig {
        field: FieldKey::Location,
        applies_to: vec![DraftReport],
        required: false,
        priority: None,
        scope: first_page.clone(),
        locator: LocatorConfig::Filename {
            pattern: r"Report_((?:West|East|North|South|Central)_Delhi|[A-Z][a-z]+(?:_[A-Z][a-z]+)*)"
                .to_string(),
            group: 1,
        },
    });
    rules.push(regex_rule(
        FieldKey::Location,
        both,
        false,
        first_page.clone(),
        format!(r"\b({})\b", CITIES),
    ));
    rules.push(regex_rule(
        FieldKey::Location,
        both,
        false,
        first_page.clone(),
        format!(
            r"\b([A-Z][A-Za-z]+(?:[ \t]+[A-Z][A-Za-z]+)*),?[ \t]+(?:{})\b",
            STATES
        ),
    ));

    for pattern in [
        format!("({})", word_date),
        format!(
            r"\b(\d{{2}}(?:\s+|-|/)?(?:{}|{})(?:\s+|-|/)\d{{4}})",
            MONTHS, MONTHS_SHORT
        ),
        r"\b(\d{4}-\d{2}-\d{2})\b".to_string(),
        r"\b(\d{2}/\d{2}/\d{4})\b".to_string(),
        r"\b(\d{2}-[A-Za-z]{3}-\d{4})\b".to_string(),
    ] {
        rules.push(regex_rule(
            FieldKey::ReportDate,
            both,
            true,
            first_page.clone(),
            pattern,
        ));
    }

    for (pattern, insensitive) in [
        (
            format!(r"(?:request|mail)\s+was\s+received.*?on\s+({})", word_date),
            true,
        ),
        (format!(r"(?:received|conducted).*?on\s+({})", word_date), true),
        (format!("({})", word_date), false),
    ] {
        rules.push(RuleConfig {
            field: FieldKey::MailReceivedDate,
            applies_to: Vec::new(),
            required: false,
            priority: None,
            scope: summary.clone(),
            locator: LocatorConfig::Regex {
                pattern,
                group: 1,
                case_insensitive: insensitive,
                must_appear_in_filename: false,
            },
        });
    }

    rules
}
