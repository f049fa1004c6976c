//! Export the aggregate state as JSON.
//!
//! Produces one file holding the run report and every aggregate table, for
//! downstream tooling that does not read spreadsheets.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::aggregate::AggregateState;
use crate::ingest::RunReport;

#[derive(Serialize)]
struct ExportData<'a> {
    generated_at: String,
    run: &'a RunReport,
    state: &'a AggregateState,
}

pub fn to_json(state: &AggregateState, report: &RunReport) -> Result<String> {
    let data = ExportData {
        generated_at: chrono::Local::now().to_rfc3339(),
        run: report,
        state,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

/// Writes the export to `path`, creating parent directories as needed.
pub fn write_json(state: &AggregateState, report: &RunReport, path: &Path) -> Result<()> {
    let json = to_json(state, report)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write JSON export: {}", path.display()))?;
    log::info!(
        "exported {} records to {}",
        state.records,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_has_run_and_state() {
        let json = to_json(&AggregateState::default(), &RunReport::default()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["run"]["scanned"], 0);
        assert!(v["state"]["tracker"].is_array());
        assert!(v["generated_at"].is_string());
    }
}
