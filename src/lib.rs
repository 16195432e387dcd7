//! apireport -- run an API test collection and report on it.
//!
//! The pipeline has three stages, each starting only after the previous one
//! finished: the collection [`runner`], the HTML and JSON [`report`]ers, and
//! the spreadsheet [`export`] that reads the JSON report back from disk.

pub mod collection;
pub mod config;
pub mod export;
pub mod report;
pub mod runner;
pub mod summary;

use anyhow::Result;

use config::AppConfig;
use summary::RunSummary;

/// Stages 1 and 2: run the collection, then write the HTML and JSON reports.
///
/// Test failures and run-invocation errors are logged but do not fail this
/// call; only report write errors do.
pub async fn run_and_report(config: &AppConfig) -> Result<RunSummary> {
    // 1. Run
    let summary = runner::run(&runner::RunOptions::from_config(config)).await;

    // 2. Report
    report::write_all(&summary, &report::configured(config))?;

    Ok(summary)
}

/// Stage 3: turn the JSON report into the review spreadsheet.
pub fn export_spreadsheet(config: &AppConfig) -> Result<usize> {
    let rows = export::export_report(
        &config.paths.json_report,
        &config.paths.xlsx_report,
        &config.sheet,
    )?;
    Ok(rows)
}

/// Full pipeline. Exits non-zero (via `Err`) only on report or spreadsheet
/// I/O and parse failures.
pub async fn run_pipeline(config: &AppConfig) -> Result<RunSummary> {
    let summary = run_and_report(config).await?;
    export_spreadsheet(config)?;
    Ok(summary)
}
