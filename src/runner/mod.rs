//! Collection runner: executes every request of a collection in order and
//! produces a [`RunSummary`].
//!
//! Run-invocation errors (unreadable collection or environment, HTTP client
//! setup) never abort the pipeline. They are logged, recorded in
//! `run.error`, and whatever ran is summarized.

pub mod checks;
pub mod request;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collection::script::{ScriptPlan, ValueSource};
use crate::collection::variables::{Scope, VariableSet};
use crate::collection::{Collection, RequestItem};
use crate::config::AppConfig;
use crate::summary::{
    AssertionResult, CollectionInfo, Counter, ExecutedItem, ExecutedRequest, ExecutedResponse,
    Execution, Failure, FailureKind, KeyValue, Run, RunStats, RunSummary, RunTimings, VariableDump,
};
use checks::ResponseView;

/// Inputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub collection: PathBuf,
    pub environment: PathBuf,
    pub globals: Option<PathBuf>,
    pub iteration_count: u32,
    pub request_timeout: Option<Duration>,
    pub follow_redirects: bool,
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            collection: config.paths.collection.clone(),
            environment: config.paths.environment.clone(),
            globals: config.paths.globals.clone(),
            iteration_count: config.run.iteration_count,
            request_timeout: config.run.request_timeout_ms.map(Duration::from_millis),
            follow_redirects: config.run.follow_redirects,
        }
    }
}

/// Run the collection and log the outcome. Never fails.
pub async fn run(options: &RunOptions) -> RunSummary {
    let iterations = options.iteration_count.max(1);
    info!(
        collection = %options.collection.display(),
        environment = %options.environment.display(),
        iterations,
        "starting collection run"
    );

    let mut recorder = Recorder::new();
    let mut collection_info = CollectionInfo::default();
    let mut scope = Scope::default();

    match Runner::prepare(options, iterations) {
        Ok(mut runner) => {
            collection_info = runner.info();
            runner.execute(&mut recorder).await;
            scope = runner.scope;
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "collection run encountered an error");
            recorder.error = Some(format!("{:#}", e));
        }
    }

    let summary = recorder.finish(collection_info, &scope, iterations);
    log_outcome(&summary);
    summary
}

fn log_outcome(summary: &RunSummary) {
    info!(
        requests = summary.run.stats.requests.total,
        assertions = summary.run.stats.assertions.total,
        "collection run completed"
    );
    let failures = summary.failure_count();
    if failures > 0 {
        warn!(
            failures,
            "some tests failed ({} failures), check the report for details", failures
        );
    } else if summary.run.error.is_some() {
        warn!("collection run did not start, check the report for details");
    } else {
        info!("all tests passed");
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Runner {
    client: Client,
    collection: Collection,
    scope: Scope,
    iterations: u32,
}

impl Runner {
    fn prepare(options: &RunOptions, iterations: u32) -> Result<Self> {
        let collection = Collection::load(&options.collection)
            .context("failed to load collection")?;
        let environment = VariableSet::load(&options.environment)
            .context("failed to load environment")?;
        let globals = match &options.globals {
            Some(path) => VariableSet::load(path).context("failed to load globals")?,
            None => VariableSet::new("globals"),
        };

        let redirect = if options.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let mut builder = Client::builder()
            .user_agent(concat!("apireport/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build HTTP client")?;

        let scope = Scope {
            locals: VariableSet::new("locals"),
            environment,
            collection: VariableSet::from_collection(&collection.variable),
            globals,
        };

        Ok(Self {
            client,
            collection,
            scope,
            iterations,
        })
    }

    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.collection.info.name.clone(),
            description: self
                .collection
                .info
                .description
                .as_ref()
                .map(|d| d.text().to_string()),
        }
    }

    async fn execute(&mut self, recorder: &mut Recorder) {
        let items = self.collection.requests();
        info!(requests = items.len(), "collection loaded");

        for iteration in 0..self.iterations {
            for item in &items {
                let execution = self.run_item(item, iteration).await;
                recorder.record(execution);
            }
        }
    }

    async fn run_item(&mut self, item: &RequestItem, iteration: u32) -> Execution {
        self.scope.locals.clear();

        let pre = ScriptPlan::parse_all(&item.prerequest);
        for setter in &pre.setters {
            match &setter.value {
                ValueSource::Literal(v) => {
                    self.scope.set(setter.scope, &setter.key, v.clone())
                }
                ValueSource::Json(_) => {
                    warn!(item = %item.name, key = %setter.key, "pre-request script cannot read the response")
                }
            }
        }
        let tests = ScriptPlan::parse_all(&item.tests);

        let mut execution = Execution {
            id: item.id.clone(),
            iteration,
            item: ExecutedItem {
                name: item.name.clone(),
                folders: item.folders.clone(),
                description: item.folder_description.clone(),
            },
            request: ExecutedRequest {
                method: item.request.method.to_uppercase(),
                url: String::new(),
                headers: Vec::new(),
                body: None,
            },
            response: None,
            assertions: Vec::new(),
            request_error: None,
        };

        let prepared = match request::prepare(&self.client, item, &self.scope) {
            Ok(p) => p,
            Err((record, message)) => {
                execution.request = record;
                return fail_request(execution, &tests, message);
            }
        };
        execution.request = prepared.record;
        debug!(method = %execution.request.method, url = %execution.request.url, "sending request");

        let started = Instant::now();
        let response = match self.client.execute(prepared.request).await {
            Ok(r) => r,
            Err(e) => return fail_request(execution, &tests, format!("{}", e)),
        };

        let code = response.status().as_u16();
        let status = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                execution.request_error = Some(format!("failed to read response body: {}", e));
                Default::default()
            }
        };
        let time_ms = started.elapsed().as_millis() as u64;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        debug!(code, time_ms, size = bytes.len(), "response received");

        let view = ResponseView::new(code, time_ms, &headers, &body);
        for block in &tests.tests {
            let result = if block.checks.is_empty() {
                warn!(item = %item.name, test = %block.name, "no recognised checks in test, marking skipped");
                AssertionResult {
                    assertion: block.name.clone(),
                    skipped: true,
                    error: None,
                }
            } else {
                AssertionResult {
                    assertion: block.name.clone(),
                    skipped: false,
                    error: block
                        .checks
                        .iter()
                        .find_map(|check| checks::evaluate(check, &view).err()),
                }
            };
            execution.assertions.push(result);
        }

        for setter in &tests.setters {
            match view.value_of(&setter.value) {
                Some(value) => self.scope.set(setter.scope, &setter.key, value),
                None => warn!(item = %item.name, key = %setter.key, "variable source not found in response"),
            }
        }

        execution.response = Some(ExecutedResponse {
            code,
            status,
            response_time: time_ms,
            response_size: bytes.len() as u64,
            headers: headers
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
            body: Some(body),
        });
        execution
    }
}

/// Without a response every test fails with the request error.
fn fail_request(mut execution: Execution, tests: &ScriptPlan, message: String) -> Execution {
    warn!(item = %execution.item.name, error = %message, "request failed");
    execution.assertions = tests
        .tests
        .iter()
        .map(|t| AssertionResult {
            assertion: t.name.clone(),
            skipped: false,
            error: Some(format!("no response: {}", message)),
        })
        .collect();
    execution.request_error = Some(message);
    execution
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Accumulates executions, failures and counters.
struct Recorder {
    started: chrono::DateTime<Utc>,
    executions: Vec<Execution>,
    failures: Vec<Failure>,
    requests: Counter,
    assertions: Counter,
    error: Option<String>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            started: Utc::now(),
            executions: Vec::new(),
            failures: Vec::new(),
            requests: Counter::default(),
            assertions: Counter::default(),
            error: None,
        }
    }

    fn record(&mut self, execution: Execution) {
        self.requests.total += 1;
        if let Some(message) = &execution.request_error {
            self.requests.failed += 1;
            self.failures.push(Failure {
                source: execution.item.name.clone(),
                iteration: execution.iteration,
                kind: FailureKind::Request,
                test: None,
                message: message.clone(),
            });
        }
        for assertion in &execution.assertions {
            self.assertions.total += 1;
            if let Some(message) = &assertion.error {
                self.assertions.failed += 1;
                self.failures.push(Failure {
                    source: execution.item.name.clone(),
                    iteration: execution.iteration,
                    kind: FailureKind::Assertion,
                    test: Some(assertion.assertion.clone()),
                    message: message.clone(),
                });
            }
        }
        self.executions.push(execution);
    }

    fn finish(self, collection: CollectionInfo, scope: &Scope, iterations: u32) -> RunSummary {
        let times: Vec<u64> = self
            .executions
            .iter()
            .filter_map(|e| e.response.as_ref().map(|r| r.response_time))
            .collect();
        let average = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<u64>() as f64 / times.len() as f64
        };

        RunSummary {
            id: Uuid::new_v4(),
            collection,
            environment: dump(&scope.environment),
            globals: dump(&scope.globals),
            run: Run {
                stats: RunStats {
                    iterations,
                    requests: self.requests,
                    assertions: self.assertions,
                },
                timings: RunTimings {
                    started: self.started,
                    completed: Utc::now(),
                    response_average_ms: average,
                    response_min_ms: times.iter().copied().min().unwrap_or(0),
                    response_max_ms: times.iter().copied().max().unwrap_or(0),
                },
                executions: self.executions,
                failures: self.failures,
                error: self.error,
            },
        }
    }
}

fn dump(set: &VariableSet) -> VariableDump {
    VariableDump {
        name: set.name.clone(),
        values: set.iter().map(|(k, v)| KeyValue::new(k, v)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_collection_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            collection: dir.path().join("missing.json"),
            environment: dir.path().join("env.json"),
            globals: None,
            iteration_count: 1,
            request_timeout: None,
            follow_redirects: true,
        };
        let summary = run(&options).await;
        assert!(summary.run.executions.is_empty());
        let error = summary.run.error.as_deref().unwrap();
        assert!(error.contains("failed to load collection"));
        assert!(error.contains("missing.json"));
        assert!(!summary.all_passed());
        assert_eq!(summary.failure_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_failure() {
        let dir = tempfile::tempdir().unwrap();
        let collection = dir.path().join("c.json");
        let environment = dir.path().join("e.json");
        std::fs::write(
            &collection,
            r#"{ "info": { "name": "c" }, "item": [ {
                "name": "Down",
                "request": "http://127.0.0.1:1/health",
                "event": [ { "listen": "test", "script": { "exec": [
                    "pm.test(\"Status code is 200\", function () { pm.response.to.have.status(200); });"
                ] } } ]
            } ] }"#,
        )
        .unwrap();
        std::fs::write(&environment, r#"{ "name": "e", "values": [] }"#).unwrap();

        let options = RunOptions {
            collection,
            environment,
            globals: None,
            iteration_count: 1,
            request_timeout: Some(Duration::from_secs(5)),
            follow_redirects: true,
        };
        let summary = run(&options).await;
        assert!(summary.run.error.is_none());
        assert_eq!(summary.run.stats.requests, Counter { total: 1, failed: 1 });
        assert_eq!(summary.run.stats.assertions, Counter { total: 1, failed: 1 });
        assert_eq!(summary.failure_count(), 2);
        let exec = &summary.run.executions[0];
        assert!(exec.response.is_none());
        assert!(exec.request_error.is_some());
        assert_eq!(exec.request.url, "http://127.0.0.1:1/health");
    }

    #[tokio::test]
    async fn zero_iterations_runs_once_and_reports_one() {
        let dir = tempfile::tempdir().unwrap();
        let collection = dir.path().join("c.json");
        let environment = dir.path().join("e.json");
        std::fs::write(
            &collection,
            r#"{ "info": { "name": "c" }, "item": [ { "name": "Down", "request": "http://127.0.0.1:1/" } ] }"#,
        )
        .unwrap();
        std::fs::write(&environment, r#"{ "name": "e", "values": [] }"#).unwrap();

        let options = RunOptions {
            collection,
            environment,
            globals: None,
            iteration_count: 0,
            request_timeout: Some(Duration::from_secs(5)),
            follow_redirects: true,
        };
        let summary = run(&options).await;
        assert_eq!(summary.run.stats.iterations, 1);
        assert_eq!(summary.run.executions.len(), 1);
    }
}
