//! Run reporters: HTML summary page and JSON run summary.

pub mod html;
pub mod json;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::summary::RunSummary;

/// Something that persists a finished run.
pub trait Reporter {
    fn name(&self) -> &'static str;
    fn path(&self) -> &Path;
    fn write(&self, summary: &RunSummary) -> Result<()>;
}

/// Reporters configured for a pipeline run, HTML first.
pub fn configured(config: &AppConfig) -> Vec<Box<dyn Reporter>> {
    vec![
        Box::new(html::HtmlReporter::new(
            config.paths.html_report.clone(),
            config.html.clone(),
        )),
        Box::new(json::JsonReporter::new(config.paths.json_report.clone())),
    ]
}

/// Write every report. The first failure aborts.
pub fn write_all(summary: &RunSummary, reporters: &[Box<dyn Reporter>]) -> Result<()> {
    for reporter in reporters {
        reporter
            .write(summary)
            .with_context(|| format!("{} reporter failed", reporter.name()))?;
        info!(
            reporter = reporter.name(),
            path = %reporter.path().display(),
            "report written"
        );
    }
    Ok(())
}

/// Write `contents` to `path`, creating parent directories.
pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))
}
