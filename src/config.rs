//! TOML configuration for apireport.
//!
//! A layered configuration model: an explicit `--config` path, then the
//! `APIREPORT_CONFIG` environment variable, then `./apireport.toml`, then
//! compiled-in defaults. The defaults reproduce the fixed paths and report
//! options the pipeline has always used.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default collection definition, relative to the working directory.
pub const DEFAULT_COLLECTION: &str = "collection/Dandys_commerce_collection.json";
/// Default environment definition.
pub const DEFAULT_ENVIRONMENT: &str = "collection/dandy_env.json";
/// Default HTML report output.
pub const DEFAULT_HTML_REPORT: &str = "index.html";
/// Default JSON run-summary output, also the spreadsheet stage input.
pub const DEFAULT_JSON_REPORT: &str = "reports/report.json";
/// Default XLSX output.
pub const DEFAULT_XLSX_REPORT: &str = "reports/report.xlsx";

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "APIREPORT_CONFIG";
/// Config file picked up from the working directory when present.
pub const LOCAL_CONFIG_FILE: &str = "apireport.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub html: HtmlConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the fallbacks only
    /// warn when they exist but cannot be parsed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "APIREPORT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Input and output file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub collection: PathBuf,
    pub environment: PathBuf,
    /// Optional globals file, same format as an environment.
    pub globals: Option<PathBuf>,
    pub html_report: PathBuf,
    pub json_report: PathBuf,
    pub xlsx_report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            collection: PathBuf::from(DEFAULT_COLLECTION),
            environment: PathBuf::from(DEFAULT_ENVIRONMENT),
            globals: None,
            html_report: PathBuf::from(DEFAULT_HTML_REPORT),
            json_report: PathBuf::from(DEFAULT_JSON_REPORT),
            xlsx_report: PathBuf::from(DEFAULT_XLSX_REPORT),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Runner behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of passes over the collection.
    pub iteration_count: u32,
    /// Per-request timeout in milliseconds. Unset means no timeout.
    pub request_timeout_ms: Option<u64>,
    /// Follow HTTP redirects.
    pub follow_redirects: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iteration_count: 1,
            request_timeout_ms: None,
            follow_redirects: true,
        }
    }
}

// ---------------------------------------------------------------------------
// HTML report
// ---------------------------------------------------------------------------

/// HTML report rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    pub browser_title: String,
    pub title: String,
    /// Heading level of the title, 1..=6.
    pub title_size: u8,
    pub show_only_fails: bool,
    pub omit_headers: bool,
    /// Header names hidden from the report (case-insensitive).
    pub skip_headers: Vec<String>,
    pub omit_request_bodies: bool,
    pub omit_response_bodies: bool,
    pub show_environment_data: bool,
    pub skip_environment_vars: Vec<String>,
    pub show_global_data: bool,
    pub skip_global_vars: Vec<String>,
    /// Drop all request/response headers and bodies from the report.
    pub skip_sensitive_data: bool,
    pub show_folder_description: bool,
    /// `"UTC"` or `"local"`.
    pub timezone: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            browser_title: "Dandy's Commerce API Report".to_string(),
            title: "Dandy's Commerce Test Report".to_string(),
            title_size: 4,
            show_only_fails: false,
            omit_headers: false,
            skip_headers: vec!["Authorization".to_string()],
            omit_request_bodies: false,
            omit_response_bodies: false,
            show_environment_data: true,
            skip_environment_vars: vec!["API_KEY".to_string(), "SECRET".to_string()],
            show_global_data: true,
            skip_global_vars: vec!["API_TOKEN".to_string()],
            skip_sensitive_data: true,
            show_folder_description: true,
            timezone: "UTC".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet
// ---------------------------------------------------------------------------

/// Spreadsheet export options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub worksheet_name: String,
    /// Initial value of both review columns.
    pub placeholder: String,
    pub developer_choices: Vec<String>,
    pub qa_choices: Vec<String>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            worksheet_name: "API Results".to_string(),
            placeholder: "Pending".to_string(),
            developer_choices: ["Pending", "Fixed", "Won't Fix", "Needs Info"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            qa_choices: ["Pending", "Verified", "Reopened"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
