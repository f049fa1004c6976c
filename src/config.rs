//! TOML configuration.
//!
//! Every section is optional; an absent file or section falls back to the
//! built-in defaults, which reproduce the layouts of the documents this tool
//! was written for. Alias tables and recognition rules live here so that new
//! spellings and layouts can be handled without a rebuild.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::models::{Classification, FieldKey, TableColumn};
use crate::rules::RuleSet;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Replaces the built-in rule set when non-empty.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// The rule configuration in effect: the configured rules, or the defaults.
    pub fn effective_rules(&self) -> Vec<RuleConfig> {
        if self.rules.is_empty() {
            crate::rules::default_rules()
        } else {
            self.rules.clone()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.PDF".to_string()]
}
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

/// Layout of the manufacturer statistics table.
#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    #[serde(default = "default_header_keyword")]
    pub header_keyword: String,
    #[serde(default = "default_section_anchor")]
    pub section_anchor: String,
    #[serde(default = "default_section_end_markers")]
    pub section_end_markers: Vec<String>,
    /// Order of the value columns following the manufacturer name.
    #[serde(default = "default_columns")]
    pub columns: Vec<TableColumn>,
    /// Rows whose name contains one of these (case-insensitive) are skipped.
    #[serde(default = "default_skip_names")]
    pub skip_names: Vec<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            header_keyword: default_header_keyword(),
            section_anchor: default_section_anchor(),
            section_end_markers: default_section_end_markers(),
            columns: default_columns(),
            skip_names: default_skip_names(),
        }
    }
}

fn default_header_keyword() -> String {
    "manufacturer".to_string()
}
fn default_section_anchor() -> String {
    "Summary of information gathered".to_string()
}
fn default_section_end_markers() -> Vec<String> {
    vec!["Annexure".to_string(), "Exhibit".to_string()]
}
fn default_columns() -> Vec<TableColumn> {
    vec![
        TableColumn::Percentage,
        TableColumn::LooseUnits,
        TableColumn::FullCases,
        TableColumn::LooseRepeat,
        TableColumn::CasesRepeat,
    ]
}
fn default_skip_names() -> Vec<String> {
    vec!["total".to_string(), "none".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AliasConfig {
    /// Canonical manufacturer name → known spelling variants.
    #[serde(default)]
    pub manufacturers: BTreeMap<String, Vec<String>>,
    /// Full bottler name → short code used in the tracker.
    #[serde(default = "default_bottlers")]
    pub bottlers: BTreeMap<String, String>,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            manufacturers: BTreeMap::new(),
            bottlers: default_bottlers(),
        }
    }
}

fn default_bottlers() -> BTreeMap<String, String> {
    [
        ("Moon Beverages Limited", "Moon"),
        ("SLMG Beverages Private Limited", "SLMG"),
        ("Enrich Agro Food Products Private Limited", "Enrich"),
        ("Enrich Agro Food Products Pvt. Ltd.", "Enrich"),
        ("Kandhari Beverages Limited", "KBL"),
        ("Udaipur Beverages Limited", "UBL"),
        ("Narmada Drinks Pvt Ltd", "NDPL"),
        ("Ludhiana Beverages Private Limited", "LBPL"),
        ("Kandhari Global Beverages Private Limited", "KGB"),
        ("Superior Drinks Pvt. Ltd.", "SDPL"),
        ("Hindustan Coca-Cola Beverages Pvt. Ltd.", "HCCB"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Who planned the audit, keyed by survey number prefix.
#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_planner")]
    pub default_planner: String,
    #[serde(default = "default_prefixes")]
    pub prefixes: BTreeMap<String, String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_planner: default_planner(),
            prefixes: default_prefixes(),
        }
    }
}

fn default_planner() -> String {
    "EY".to_string()
}
fn default_prefixes() -> BTreeMap<String, String> {
    BTreeMap::from([("SR".to_string(), "BDO".to_string())])
}

impl AuditConfig {
    /// Longest matching prefix wins.
    pub fn planner_for(&self, survey_no: &str) -> &str {
        self.prefixes
            .iter()
            .filter(|(prefix, _)| !prefix.is_empty() && survey_no.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, planner)| planner.as_str())
            .unwrap_or(&self.default_planner)
    }
}

/// One recognition rule.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuleConfig {
    pub field: FieldKey,
    /// Classifications this rule applies to; empty means all recognized ones.
    #[serde(default)]
    pub applies_to: Vec<Classification>,
    #[serde(default)]
    pub required: bool,
    /// Lower runs first; rules without a priority keep declaration order
    /// after all prioritized ones.
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub scope: ScopeConfig,
    pub locator: LocatorConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorConfig {
    /// Value follows a fixed label on the same line, or on the next
    /// non-empty line.
    Label { label: String },
    Regex {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
        #[serde(default)]
        case_insensitive: bool,
        /// Only accept values that also appear in the file name.
        #[serde(default)]
        must_appear_in_filename: bool,
    },
    /// Up to `count` lines preceding the first line containing `anchor`.
    LinesBefore {
        anchor: String,
        count: usize,
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Regex applied to the file name.
    Filename {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
}

fn default_group() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ScopeConfig {
    #[serde(default)]
    pub pages: PageScope,
    /// Only text after the first line containing this heading is searched.
    #[serde(default)]
    pub after: Option<String>,
    /// Searching stops at the first line containing any of these.
    #[serde(default)]
    pub until: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageScope {
    #[default]
    First,
    Leading(usize),
    All,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` when it exists, otherwise returns the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        log::info!(
            "config file {} not found, using built-in defaults",
            path.display()
        );
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.pipeline.workers == 0 {
        bail!("pipeline.workers must be >= 1");
    }

    if config.input.max_file_bytes == 0 {
        bail!("input.max_file_bytes must be > 0");
    }

    if config.input.include_globs.is_empty() {
        bail!("input.include_globs must not be empty");
    }

    if config.table.columns.is_empty() {
        bail!("table.columns must list at least one column");
    }
    let unique: BTreeSet<_> = config.table.columns.iter().collect();
    if unique.len() != config.table.columns.len() {
        bail!("table.columns must not repeat a column");
    }

    for (canonical, variants) in &config.aliases.manufacturers {
        if canonical.trim().is_empty() {
            bail!("aliases.manufacturers has an empty canonical name");
        }
        if variants.iter().any(|v| v.trim().is_empty()) {
            bail!("aliases.manufacturers.{} has an empty variant", canonical);
        }
    }

    for rule in &config.rules {
        if let LocatorConfig::LinesBefore { count: 0, .. } = rule.locator {
            bail!("rule for '{}': lines_before.count must be > 0", rule.field);
        }
        if rule.applies_to.contains(&Classification::Unrecognized) {
            bail!(
                "rule for '{}': applies_to cannot include 'unrecognized'",
                rule.field
            );
        }
    }

    // Compiling catches bad regexes up front.
    RuleSet::compile(&config.effective_rules())
        .with_context(|| "Invalid recognition rules")?;

    Ok(())
}

/// Commented template written by `harvest init-config`.
pub const EXAMPLE_CONFIG: &str = r#"# draft-harvest configuration. Every section is optional.

[input]
include_globs = ["**/*.pdf", "**/*.PDF"]
exclude_globs = []
follow_symlinks = false
max_file_bytes = 52428800

[pipeline]
workers = 4

[table]
header_keyword = "manufacturer"
section_anchor = "Summary of information gathered"
section_end_markers = ["Annexure", "Exhibit"]
columns = ["percentage", "loose_units", "full_cases", "loose_repeat", "cases_repeat"]
skip_names = ["total", "none"]

# Canonical manufacturer name -> spellings seen in documents.
[aliases.manufacturers]
# "Acme Corp" = ["ACME Corporation", "Acme Co."]

# Full bottler name -> tracker short code. This table replaces the
# built-in one, so keep every bottler you still need.
[aliases.bottlers]
"Moon Beverages Limited" = "Moon"
"SLMG Beverages Private Limited" = "SLMG"
"Enrich Agro Food Products Private Limited" = "Enrich"
"Enrich Agro Food Products Pvt. Ltd." = "Enrich"
"Kandhari Beverages Limited" = "KBL"
"Udaipur Beverages Limited" = "UBL"
"Narmada Drinks Pvt Ltd" = "NDPL"
"Ludhiana Beverages Private Limited" = "LBPL"
"Kandhari Global Beverages Private Limited" = "KGB"
"Superior Drinks Pvt. Ltd." = "SDPL"
"Hindustan Coca-Cola Beverages Pvt. Ltd." = "HCCB"

[audit]
default_planner = "EY"

[audit.prefixes]
SR = "BDO"

# Uncomment to replace the built-in recognition rules.
# [[rules]]
# field = "survey_id"
# applies_to = ["draft_findings"]
# required = true
# locator = { kind = "regex", pattern = 'Survey ID:?\s*([A-Z]{2}\d{3,4})' }
#
# [[rules]]
# field = "mail_received_date"
# scope = { pages = { leading = 3 }, after = "Summary of information gathered" }
# locator = { kind = "regex", pattern = 'received.*?on\s+(\d{1,2}\s+[A-Za-z]+\s+\d{4})', case_insensitive = true }
"#;
