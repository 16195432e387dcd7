//! Deriving spreadsheet rows from execution records.

use crate::summary::{AssertionResult, Execution, KeyValue};

/// Fixed column header, in order.
pub const HEADER: [&str; 10] = [
    "Request Name",
    "Method",
    "URL",
    "Status Code",
    "Test Result",
    "Response Time (ms)",
    "Body Size (bytes)",
    "Headers",
    "Developer Comment",
    "QA Comment",
];

pub const NO_TESTS: &str = "No Tests";

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub name: String,
    pub method: String,
    pub url: String,
    /// This and the two numeric fields below are `None` when no response was
    /// received.
    pub status_code: Option<u16>,
    pub test_result: String,
    pub response_time_ms: Option<u64>,
    pub body_size_bytes: Option<u64>,
    pub headers: String,
    pub developer_comment: String,
    pub qa_comment: String,
}

impl SheetRow {
    pub fn from_execution(exec: &Execution, placeholder: &str) -> Self {
        let response = exec.response.as_ref();
        Self {
            name: strip_commas(&exec.item.name),
            method: exec.request.method.clone(),
            url: exec.request.url.clone(),
            status_code: response.map(|r| r.code),
            test_result: test_result_summary(&exec.assertions),
            response_time_ms: response.map(|r| r.response_time),
            body_size_bytes: response.map(|r| r.response_size),
            headers: response
                .map(|r| header_summary(&r.headers))
                .unwrap_or_default(),
            developer_comment: placeholder.to_string(),
            qa_comment: placeholder.to_string(),
        }
    }
}

pub fn strip_commas(name: &str) -> String {
    name.replace(',', "")
}

/// `name: ✅|name: ❌`, or [`NO_TESTS`].
pub fn test_result_summary(assertions: &[AssertionResult]) -> String {
    if assertions.is_empty() {
        return NO_TESTS.to_string();
    }
    assertions
        .iter()
        .map(|a| {
            let mark = if a.passed() { "✅" } else { "❌" };
            format!("{}: {}", a.assertion, mark)
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// `key: value; key: value` with double quotes turned into single quotes.
pub fn header_summary(headers: &[KeyValue]) -> String {
    headers
        .iter()
        .map(|h| format!("{}: {}", h.key, h.value))
        .collect::<Vec<_>>()
        .join("; ")
        .replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{ExecutedItem, ExecutedRequest, ExecutedResponse};

    fn assertion(name: &str, error: Option<&str>) -> AssertionResult {
        AssertionResult {
            assertion: name.to_string(),
            skipped: false,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_result_joins_marks() {
        let summary = test_result_summary(&[
            assertion("Status code is 200", None),
            assertion("Has token", Some("expected object to have property 'token'")),
        ]);
        assert_eq!(summary, "Status code is 200: ✅|Has token: ❌");
    }

    #[test]
    fn empty_assertions_read_no_tests() {
        assert_eq!(test_result_summary(&[]), "No Tests");
    }

    #[test]
    fn header_quotes_are_normalised() {
        let summary = header_summary(&[
            KeyValue::new("ETag", "W/\"abc\""),
            KeyValue::new("Content-Type", "application/json"),
        ]);
        assert_eq!(summary, "ETag: W/'abc'; Content-Type: application/json");
    }

    #[test]
    fn row_from_execution() {
        let exec = Execution {
            id: "1".into(),
            iteration: 0,
            item: ExecutedItem {
                name: "Create order, with coupon".into(),
                folders: vec![],
                description: None,
            },
            request: ExecutedRequest {
                method: "POST".into(),
                url: "http://shop.test/orders".into(),
                headers: vec![],
                body: None,
            },
            response: Some(ExecutedResponse {
                code: 201,
                status: "Created".into(),
                response_time: 87,
                response_size: 312,
                headers: vec![KeyValue::new("X-Id", "\"9\"")],
                body: None,
            }),
            assertions: vec![assertion("Created", None)],
            request_error: None,
        };
        let row = SheetRow::from_execution(&exec, "Pending");
        assert_eq!(row.name, "Create order with coupon");
        assert_eq!(row.status_code, Some(201));
        assert_eq!(row.test_result, "Created: ✅");
        assert_eq!(row.response_time_ms, Some(87));
        assert_eq!(row.body_size_bytes, Some(312));
        assert_eq!(row.headers, "X-Id: '9'");
        assert_eq!(row.developer_comment, "Pending");
        assert_eq!(row.qa_comment, "Pending");
    }

    #[test]
    fn row_without_response() {
        let exec = Execution {
            id: "1".into(),
            iteration: 0,
            item: ExecutedItem {
                name: "Down".into(),
                folders: vec![],
                description: None,
            },
            request: ExecutedRequest {
                method: "GET".into(),
                url: "http://down.test/".into(),
                headers: vec![],
                body: None,
            },
            response: None,
            assertions: vec![],
            request_error: Some("connection refused".into()),
        };
        let row = SheetRow::from_execution(&exec, "Pending");
        assert_eq!(row.status_code, None);
        assert_eq!(row.response_time_ms, None);
        assert_eq!(row.body_size_bytes, None);
        assert_eq!(row.headers, "");
        assert_eq!(row.test_result, NO_TESTS);
    }
}
