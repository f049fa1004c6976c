//! # Draft Harvest CLI (`harvest`)
//!
//! The `harvest` binary scans a directory of "Draft Report" and "Draft
//! Findings" PDFs, extracts their fields and manufacturer tables, and writes
//! the aggregated workbooks.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest run <dir>` | Process every matching PDF under `<dir>` and write workbooks |
//! | `harvest inspect <file>` | Show what is extracted from a single PDF |
//! | `harvest init-config [path]` | Write a commented configuration template |
//! | `harvest completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Original workbook only, next to the PDFs
//! harvest run ./reports
//!
//! # Both workbooks plus a JSON dump, no progress lines
//! harvest run ./reports --original out/original.xlsx --report out/report.xlsx \
//!     --json out/state.json --progress off
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use draft_harvest::config::{self, EXAMPLE_CONFIG};
use draft_harvest::diagnostics::LogSink;
use draft_harvest::ingest::{self, Pipeline, RunOptions, StopSignal};
use draft_harvest::progress::ProgressMode;
use draft_harvest::stats;

/// Draft Harvest CLI: extracts structured records from draft report PDFs
/// and aggregates them into tracker workbooks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist the built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Draft Harvest: extract and aggregate draft report PDFs",
    version,
    long_about = "Draft Harvest reads 'Draft Report' and 'Draft Findings' PDFs, recognizes \
    company, project, location and date fields plus the manufacturer statistics table, \
    normalizes them, and writes an original and a report workbook."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. Alias tables, recognition rules,
    /// and pipeline settings are read from this file.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Log more (info level). `RUST_LOG` overrides this.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a directory of PDFs.
    ///
    /// Scans `dir` recursively for PDFs whose name contains "Draft Report"
    /// or "Draft Findings", extracts and aggregates them, and writes the
    /// requested outputs. Unreadable documents are skipped and reported.
    Run {
        /// Directory holding the PDFs.
        dir: PathBuf,

        /// Where to write the original workbook.
        /// Defaults to `<dir>/pdf_extraction_original_<timestamp>.xlsx`.
        #[arg(long)]
        original: Option<PathBuf>,

        /// Skip the original workbook.
        #[arg(long, conflicts_with = "original")]
        no_original: bool,

        /// Also write the report workbook (tracker + source summary) here.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Also write the aggregate state and run report as JSON here.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Override `pipeline.workers`.
        #[arg(long)]
        workers: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show the fields extracted from one PDF.
    ///
    /// Prints the raw extraction, the normalized record, and any
    /// diagnostics as JSON. Useful when tuning recognition rules.
    Inspect {
        /// Path to the PDF.
        file: PathBuf,
    },

    /// Write a commented configuration template.
    InitConfig {
        /// Destination; defaults to the `--config` path.
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't require config
    match &cli.command {
        Commands::InitConfig { path, force } => {
            let path = path.clone().unwrap_or_else(|| cli.config.clone());
            scaffold_config(&path, *force)?;
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "harvest", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            dir,
            original,
            no_original,
            report,
            json,
            workers,
            progress,
        } => {
            if let Some(w) = workers {
                cfg.pipeline.workers = w;
            }
            config::validate(&cfg)?;

            let options = RunOptions {
                input: dir,
                original,
                write_original: !no_original,
                report,
                json,
            };
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let pipeline = Pipeline::from_config(&cfg)?;

            let stop = StopSignal::new();
            let on_signal = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("interrupt received, finishing in-flight documents");
                    on_signal.stop();
                }
            });

            let (state, run) = ingest::run_harvest(
                &cfg,
                &options,
                &pipeline,
                reporter.as_ref(),
                &LogSink,
                &stop,
            )
            .await?;
            stats::print_run_summary(&state, &run);
        }
        Commands::Inspect { file } => {
            let inspection = ingest::inspect_file(&cfg, &file)?;
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
        Commands::InitConfig { .. } | Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn scaffold_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    config::load_config(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
