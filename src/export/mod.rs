//! JSON run summary to XLSX spreadsheet export.
//!
//! The report is fully read and parsed before a workbook is created, so a
//! malformed report never leaves a spreadsheet behind.

pub mod row;
pub mod sheet;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::SheetConfig;
use crate::summary::RunSummary;
use row::SheetRow;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to read report file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse report file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create output directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write spreadsheet {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// Read a JSON run summary.
pub fn read_summary(path: &Path) -> Result<RunSummary, ExportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ExportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// One row per execution, in input order.
pub fn rows(summary: &RunSummary, options: &SheetConfig) -> Vec<SheetRow> {
    summary
        .run
        .executions
        .iter()
        .map(|exec| SheetRow::from_execution(exec, &options.placeholder))
        .collect()
}

/// Convert the report at `input` into a spreadsheet at `output`.
/// Returns the number of data rows written.
pub fn export_report(input: &Path, output: &Path, options: &SheetConfig) -> Result<usize, ExportError> {
    let summary = read_summary(input)?;
    let rows = rows(&summary, options);

    let write_err = |source| ExportError::Write {
        path: output.to_path_buf(),
        source,
    };
    let mut workbook = sheet::build_workbook(&rows, options).map_err(write_err)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    workbook.save(output).map_err(write_err)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows = rows.len(),
        "spreadsheet written"
    );
    Ok(rows.len())
}
