//! # Draft Harvest
//!
//! Extracts structured records from "Draft Report" and "Draft Findings" PDF
//! documents and aggregates them into cross-document workbooks.
//!
//! Each document is read page by page, matched against an ordered set of
//! recognition rules, normalized (dates, manufacturer names, table counts),
//! and folded into a single aggregate state. The state is then projected
//! into two workbook shapes: the "original" workbook (basic info and
//! manufacturer statistics) and the "report" workbook (injured tracker and
//! source summary).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │  Scanner   │──▶│  Reader  │──▶│ Extractor │──▶│ Normalizer│
//! │ walk + glob│   │ lopdf    │   │ rules+tbl │   │ dates/alias│
//! └────────────┘   └──────────┘   └───────────┘   └─────┬─────┘
//!                        (worker threads)               │
//!                                                       ▼
//!                 ┌──────────┐   ┌───────────┐   ┌────────────┐
//!                 │ xlsx/JSON│◀──│ Assembler │◀──│ Aggregator │
//!                 └──────────┘   └───────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init-config                      # write config/harvest.toml
//! harvest run ./reports --report report.xlsx
//! harvest inspect "./reports/SR1042 Draft Findings.pdf"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`connector_fs`] | Directory scan and file selection |
//! | [`reader`] | Page text from PDF files |
//! | [`rules`] | Recognition rules and matchers |
//! | [`table`] | Manufacturer table recognition |
//! | [`extract`] | Per-document field extraction |
//! | [`normalize`] | Dates, aliases, and counts |
//! | [`aggregate`] | Cross-document aggregation |
//! | [`report`] | Workbook assembly |
//! | [`xlsx`] | Workbook writer |
//! | [`export`] | JSON export |
//! | [`ingest`] | Run orchestration |
//! | [`diagnostics`] | Structured diagnostics |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | Run summary |

pub mod aggregate;
pub mod config;
pub mod connector_fs;
pub mod diagnostics;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reader;
pub mod report;
pub mod rules;
pub mod stats;
pub mod table;
pub mod xlsx;
