//! JSON run-summary reporter.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{write_file, Reporter};
use crate::summary::RunSummary;

pub struct JsonReporter {
    path: PathBuf,
}

impl JsonReporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Reporter for JsonReporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, summary: &RunSummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        write_file(&self.path, &json)
    }
}
