//! HTML summary reporter.
//!
//! The page is rendered from `templates/report.html`. All masking happens
//! while building the view model so the template only formats strings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use askama::Template;
use chrono::{DateTime, Local, Utc};

use super::{write_file, Reporter};
use crate::config::HtmlConfig;
use crate::summary::{Execution, KeyValue, RunSummary, VariableDump};

pub struct HtmlReporter {
    path: PathBuf,
    options: HtmlConfig,
}

impl HtmlReporter {
    pub fn new(path: PathBuf, options: HtmlConfig) -> Self {
        Self { path, options }
    }

    pub fn render(&self, summary: &RunSummary) -> Result<String> {
        ReportPage::build(summary, &self.options)
            .render()
            .context("failed to render HTML report")
    }
}

impl Reporter for HtmlReporter {
    fn name(&self) -> &'static str {
        "html"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, summary: &RunSummary) -> Result<()> {
        let html = self.render(summary)?;
        write_file(&self.path, &html)
    }
}

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

#[derive(Template)]
#[template(path = "report.html")]
struct ReportPage {
    browser_title: String,
    title: String,
    title_size: u8,
    collection_name: String,
    collection_description: String,
    started: String,
    completed: String,
    duration_ms: i64,
    iterations: u32,
    requests_total: usize,
    requests_failed: usize,
    assertions_total: usize,
    assertions_failed: usize,
    failure_count: usize,
    average_ms: String,
    min_ms: u64,
    max_ms: u64,
    run_error: String,
    environment_name: String,
    environment: Vec<KeyValue>,
    show_environment: bool,
    globals_name: String,
    globals: Vec<KeyValue>,
    show_globals: bool,
    failures: Vec<FailureView>,
    requests: Vec<RequestView>,
    show_only_fails: bool,
}

struct FailureView {
    source: String,
    iteration: u32,
    test: String,
    message: String,
}

struct RequestView {
    name: String,
    folder: String,
    description: String,
    iteration: u32,
    passed: bool,
    method: String,
    url: String,
    status: String,
    time_ms: String,
    size_bytes: String,
    request_headers: Vec<KeyValue>,
    request_body: String,
    response_headers: Vec<KeyValue>,
    response_body: String,
    error: String,
    assertions: Vec<AssertionView>,
}

struct AssertionView {
    name: String,
    outcome: &'static str,
    message: String,
}

impl ReportPage {
    fn build(summary: &RunSummary, options: &HtmlConfig) -> Self {
        let run = &summary.run;
        let requests = run
            .executions
            .iter()
            .filter(|e| !options.show_only_fails || !e.passed())
            .map(|e| RequestView::build(e, options))
            .collect();

        Self {
            browser_title: options.browser_title.clone(),
            title: options.title.clone(),
            title_size: options.title_size.clamp(1, 6),
            collection_name: summary.collection.name.clone(),
            collection_description: summary.collection.description.clone().unwrap_or_default(),
            started: format_time(&run.timings.started, &options.timezone),
            completed: format_time(&run.timings.completed, &options.timezone),
            duration_ms: (run.timings.completed - run.timings.started).num_milliseconds(),
            iterations: run.stats.iterations,
            requests_total: run.stats.requests.total,
            requests_failed: run.stats.requests.failed,
            assertions_total: run.stats.assertions.total,
            assertions_failed: run.stats.assertions.failed,
            failure_count: run.failures.len(),
            average_ms: format!("{:.1}", run.timings.response_average_ms),
            min_ms: run.timings.response_min_ms,
            max_ms: run.timings.response_max_ms,
            run_error: run.error.clone().unwrap_or_default(),
            environment_name: summary.environment.name.clone(),
            environment: visible_vars(&summary.environment, &options.skip_environment_vars),
            show_environment: options.show_environment_data,
            globals_name: summary.globals.name.clone(),
            globals: visible_vars(&summary.globals, &options.skip_global_vars),
            show_globals: options.show_global_data,
            failures: run
                .failures
                .iter()
                .map(|f| FailureView {
                    source: f.source.clone(),
                    iteration: f.iteration + 1,
                    test: f.test.clone().unwrap_or_else(|| "request".to_string()),
                    message: f.message.clone(),
                })
                .collect(),
            requests,
            show_only_fails: options.show_only_fails,
        }
    }
}

impl RequestView {
    fn build(exec: &Execution, options: &HtmlConfig) -> Self {
        let show_headers = !options.omit_headers && !options.skip_sensitive_data;
        let headers = |list: &[KeyValue]| -> Vec<KeyValue> {
            if !show_headers {
                return Vec::new();
            }
            list.iter()
                .filter(|h| {
                    !options
                        .skip_headers
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(&h.key))
                })
                .cloned()
                .collect()
        };
        let request_body = if options.omit_request_bodies || options.skip_sensitive_data {
            String::new()
        } else {
            exec.request.body.clone().unwrap_or_default()
        };

        let response = exec.response.as_ref();
        let response_body = match response {
            Some(r) if !options.omit_response_bodies && !options.skip_sensitive_data => {
                r.body.clone().unwrap_or_default()
            }
            _ => String::new(),
        };

        let folder = exec.item.folders.join(" / ");
        let description = if options.show_folder_description {
            exec.item.description.clone().unwrap_or_default()
        } else {
            String::new()
        };

        Self {
            name: exec.item.name.clone(),
            folder,
            description,
            iteration: exec.iteration + 1,
            passed: exec.passed(),
            method: exec.request.method.clone(),
            url: exec.request.url.clone(),
            status: response
                .map(|r| format!("{} {}", r.code, r.status).trim().to_string())
                .unwrap_or_else(|| "no response".to_string()),
            time_ms: response
                .map(|r| r.response_time.to_string())
                .unwrap_or_else(|| "-".to_string()),
            size_bytes: response
                .map(|r| r.response_size.to_string())
                .unwrap_or_else(|| "-".to_string()),
            request_headers: headers(&exec.request.headers),
            request_body,
            response_headers: response.map(|r| headers(&r.headers)).unwrap_or_default(),
            response_body,
            error: exec.request_error.clone().unwrap_or_default(),
            assertions: exec
                .assertions
                .iter()
                .map(|a| AssertionView {
                    name: a.assertion.clone(),
                    outcome: match (&a.error, a.skipped) {
                        (Some(_), _) => "fail",
                        (None, true) => "skipped",
                        (None, false) => "pass",
                    },
                    message: a.error.clone().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

fn visible_vars(dump: &VariableDump, skip: &[String]) -> Vec<KeyValue> {
    dump.values
        .iter()
        .filter(|kv| !skip.iter().any(|s| s == &kv.key))
        .cloned()
        .collect()
}

fn format_time(at: &DateTime<Utc>, timezone: &str) -> String {
    if timezone.eq_ignore_ascii_case("local") {
        at.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{
        AssertionResult, CollectionInfo, Counter, ExecutedItem, ExecutedRequest, ExecutedResponse,
        Failure, FailureKind, Run, RunStats, RunTimings,
    };

    fn execution(name: &str, error: Option<&str>) -> Execution {
        Execution {
            id: name.to_string(),
            iteration: 0,
            item: ExecutedItem {
                name: name.to_string(),
                folders: vec!["Shop".to_string()],
                description: Some("Catalogue endpoints".to_string()),
            },
            request: ExecutedRequest {
                method: "GET".to_string(),
                url: "http://api.test/items".to_string(),
                headers: vec![
                    KeyValue::new("Authorization", "Bearer secret-token"),
                    KeyValue::new("Accept", "application/json"),
                ],
                body: Some("request-body-text".to_string()),
            },
            response: Some(ExecutedResponse {
                code: 200,
                status: "OK".to_string(),
                response_time: 12,
                response_size: 2,
                headers: vec![KeyValue::new("Content-Type", "application/json")],
                body: Some("response-body-text".to_string()),
            }),
            assertions: vec![AssertionResult {
                assertion: "Status code is 200".to_string(),
                skipped: false,
                error: error.map(str::to_string),
            }],
            request_error: None,
        }
    }

    fn summary() -> RunSummary {
        let now = Utc::now();
        RunSummary {
            id: uuid::Uuid::new_v4(),
            collection: CollectionInfo {
                name: "Shop <API>".to_string(),
                description: None,
            },
            environment: VariableDump {
                name: "dev".to_string(),
                values: vec![
                    KeyValue::new("base", "http://api.test"),
                    KeyValue::new("API_KEY", "hidden-key"),
                ],
            },
            globals: VariableDump::default(),
            run: Run {
                stats: RunStats {
                    iterations: 1,
                    requests: Counter { total: 2, failed: 0 },
                    assertions: Counter { total: 2, failed: 1 },
                },
                timings: RunTimings {
                    started: now,
                    completed: now,
                    response_average_ms: 12.0,
                    response_min_ms: 12,
                    response_max_ms: 12,
                },
                executions: vec![
                    execution("List items", None),
                    execution("Broken item", Some("expected 200 but got 500")),
                ],
                failures: vec![Failure {
                    source: "Broken item".to_string(),
                    iteration: 0,
                    kind: FailureKind::Assertion,
                    test: Some("Status code is 200".to_string()),
                    message: "expected 200 but got 500".to_string(),
                }],
                error: None,
            },
        }
    }

    fn render(options: HtmlConfig) -> String {
        HtmlReporter::new(PathBuf::from("unused.html"), options)
            .render(&summary())
            .unwrap()
    }

    #[test]
    fn renders_titles_and_escapes() {
        let html = render(HtmlConfig::default());
        assert!(html.contains("<title>Dandy&#x27;s Commerce API Report</title>"));
        assert!(html.contains("<h4"));
        assert!(html.contains("Shop &lt;API&gt;"));
        assert!(html.contains("List items"));
        assert!(html.contains("expected 200 but got 500"));
    }

    #[test]
    fn sensitive_data_is_dropped_by_default() {
        let html = render(HtmlConfig::default());
        assert!(!html.contains("request-body-text"));
        assert!(!html.contains("response-body-text"));
        assert!(!html.contains("secret-token"));
        assert!(!html.contains("hidden-key"));
        assert!(html.contains("http://api.test"));
    }

    #[test]
    fn skip_headers_masks_only_listed_headers() {
        let options = HtmlConfig {
            skip_sensitive_data: false,
            ..HtmlConfig::default()
        };
        let html = render(options);
        assert!(!html.contains("secret-token"));
        assert!(html.contains("Accept"));
        assert!(html.contains("request-body-text"));
        assert!(html.contains("response-body-text"));
    }

    #[test]
    fn show_only_fails_hides_passing_requests() {
        let options = HtmlConfig {
            show_only_fails: true,
            ..HtmlConfig::default()
        };
        let html = render(options);
        assert!(html.contains("Broken item"));
        assert!(!html.contains("List items"));
    }

    #[test]
    fn skipped_tests_are_marked_apart_from_passes() {
        let mut run = summary();
        run.run.executions[0].assertions[0].skipped = true;
        let html = HtmlReporter::new(PathBuf::from("unused.html"), HtmlConfig::default())
            .render(&run)
            .unwrap();
        assert!(html.contains(">skipped</td>"));
    }
}
