//! Run summary.
//!
//! Prints what a run did: how many documents were scanned and aggregated,
//! which were skipped and why, which expected fields went missing, and where
//! the outputs were written. Used by `harvest run` once the pipeline ends.

use crate::aggregate::AggregateState;
use crate::ingest::RunReport;
use crate::progress::format_number;

/// Print the summary of a finished run to stdout.
pub fn print_run_summary(state: &AggregateState, report: &RunReport) {
    println!("Draft Harvest: Run Summary");
    println!("==========================");
    println!();
    println!("  Scanned:       {}", format_number(report.scanned as u64));
    println!("  Aggregated:    {}", format_number(report.succeeded as u64));
    println!("  Skipped:       {}", format_number(report.skipped.len() as u64));
    if report.ignored > 0 {
        println!("  Ignored PDFs:  {}", format_number(report.ignored as u64));
    }
    if report.lost > 0 {
        println!("  Lost:          {}", format_number(report.lost as u64));
    }
    println!("  Warnings:      {}", format_number(report.warnings as u64));
    println!(
        "  Manufacturers: {}  (tracker rows: {})",
        state.manufacturers.len(),
        state.tracker_rows()
    );
    if report.stopped_early {
        println!("  Stopped early: yes");
    }

    if !report.skipped.is_empty() {
        println!();
        println!("  Skipped documents:");
        println!("  {:<48} {}", "DOCUMENT", "REASON");
        println!("  {}", "-".repeat(76));
        for s in &report.skipped {
            println!("  {:<48} {}", truncate(&s.relative_path, 48), s.reason);
        }
    }

    if !report.missing_fields.is_empty() {
        println!();
        println!("  Missing fields:");
        println!("  {:<24} {:>8}", "FIELD", "RECORDS");
        println!("  {}", "-".repeat(33));
        for (field, count) in &report.missing_fields {
            println!("  {:<24} {:>8}", field.as_str(), count);
        }
    }

    if !report.outputs.is_empty() {
        println!();
        println!("  Written:");
        for path in &report.outputs {
            println!("    {}", path.display());
        }
    }

    println!();
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let head: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("short.pdf", 48), "short.pdf");
        let long = "x".repeat(60);
        assert_eq!(truncate(&long, 10).chars().count(), 10);
    }
}
