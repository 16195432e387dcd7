//! Run summary: the result of a collection run and the on-disk JSON report.
//!
//! The same types are written by the JSON reporter and read back by the
//! spreadsheet exporter. Field names follow the camelCase convention of
//! collection-runner JSON reports, and the reader accepts a URL given either
//! as a string or as an object with a `raw` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: Uuid,
    pub collection: CollectionInfo,
    #[serde(default)]
    pub environment: VariableDump,
    #[serde(default)]
    pub globals: VariableDump,
    pub run: Run,
}

impl RunSummary {
    pub fn failure_count(&self) -> usize {
        self.run.failures.len()
    }

    pub fn all_passed(&self) -> bool {
        self.run.failures.is_empty() && self.run.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Snapshot of a variable scope at the end of the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableDump {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub stats: RunStats,
    pub timings: RunTimings,
    #[serde(default)]
    pub executions: Vec<Execution>,
    #[serde(default)]
    pub failures: Vec<Failure>,
    /// Run-invocation error, e.g. an unreadable collection file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub iterations: u32,
    pub requests: Counter,
    pub assertions: Counter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub total: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTimings {
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    #[serde(default)]
    pub response_average_ms: f64,
    #[serde(default)]
    pub response_min_ms: u64,
    #[serde(default)]
    pub response_max_ms: u64,
}

/// One request invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub iteration: u32,
    pub item: ExecutedItem,
    pub request: ExecutedRequest,
    #[serde(default)]
    pub response: Option<ExecutedResponse>,
    #[serde(default)]
    pub assertions: Vec<AssertionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_error: Option<String>,
}

impl Execution {
    pub fn passed(&self) -> bool {
        self.request_error.is_none() && self.assertions.iter().all(AssertionResult::passed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedRequest {
    pub method: String,
    #[serde(deserialize_with = "url_text")]
    pub url: String,
    #[serde(default, alias = "header")]
    pub headers: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedResponse {
    pub code: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub response_time: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default, alias = "header")]
    pub headers: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion: String,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssertionResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    /// Name of the request the failure belongs to.
    pub source: String,
    pub iteration: u32,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    pub message: String,
}

fn url_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Object { raw: String },
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s,
        Repr::Object { raw } => raw,
    })
}
