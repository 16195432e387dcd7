//! Evaluating recognised script checks against a response.

use serde_json::Value;

use crate::collection::script::{Check, ValueSource};
use crate::collection::value_to_string;

/// The parts of a response checks can look at.
pub struct ResponseView<'a> {
    pub code: u16,
    pub time_ms: u64,
    pub headers: &'a [(String, String)],
    pub body: &'a str,
    json: Option<Value>,
}

impl<'a> ResponseView<'a> {
    pub fn new(code: u16, time_ms: u64, headers: &'a [(String, String)], body: &'a str) -> Self {
        Self {
            code,
            time_ms,
            headers,
            body,
            json: serde_json::from_str(body).ok(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json_at(&self, path: &[String]) -> Option<&Value> {
        let mut current = self.json.as_ref()?;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a setter value. `None` when a JSON path does not exist.
    pub fn value_of(&self, source: &ValueSource) -> Option<String> {
        match source {
            ValueSource::Literal(s) => Some(s.clone()),
            ValueSource::Json(path) => self.json_at(path).map(value_to_string),
        }
    }
}

/// Run a check; the error is an assertion message.
pub fn evaluate(check: &Check, response: &ResponseView<'_>) -> Result<(), String> {
    match check {
        Check::Status(expected) => expect(
            response.code == *expected,
            format!(
                "expected response to have status code {} but got {}",
                expected, response.code
            ),
        ),
        Check::StatusOneOf(codes) => expect(
            codes.contains(&response.code),
            format!("expected {} to be one of {:?}", response.code, codes),
        ),
        Check::Ok => expect(
            response.code == 200,
            format!("expected response code to be 200 but found {}", response.code),
        ),
        Check::Success => expect(
            (200..300).contains(&response.code),
            format!(
                "expected response code to be 2XX but found {}",
                response.code
            ),
        ),
        Check::Json => {
            let is_json_type = response
                .header("content-type")
                .map(|ct| ct.to_ascii_lowercase().contains("json"))
                .unwrap_or(false);
            expect(
                is_json_type && response.json.is_some(),
                "expected response body to be a valid json".to_string(),
            )
        }
        Check::HasHeader(name) => expect(
            response.header(name).is_some(),
            format!("expected response to have header with key '{}'", name),
        ),
        Check::ResponseTimeBelow(limit) => expect(
            (response.time_ms as f64) < *limit,
            format!("expected {} to be below {}", response.time_ms, limit),
        ),
        Check::BodyIncludes(text) => expect(
            response.body.contains(text.as_str()),
            format!("expected response body to include '{}'", text),
        ),
        Check::JsonProperty { path, property } => {
            let has = match response.json_at(path) {
                Some(Value::Object(map)) => map.contains_key(property),
                _ => false,
            };
            expect(
                has,
                format!("expected object to have property '{}'", property),
            )
        }
    }
}

fn expect(ok: bool, message: String) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), "application/json; charset=utf-8".to_string())]
    }

    #[test]
    fn status_checks() {
        let h = headers();
        let view = ResponseView::new(201, 40, &h, "{}");
        assert!(evaluate(&Check::Status(201), &view).is_ok());
        assert!(evaluate(&Check::Success, &view).is_ok());
        assert!(evaluate(&Check::StatusOneOf(vec![200, 201]), &view).is_ok());
        let err = evaluate(&Check::Ok, &view).unwrap_err();
        assert!(err.contains("201"));
        let err = evaluate(&Check::Status(200), &view).unwrap_err();
        assert_eq!(err, "expected response to have status code 200 but got 201");
    }

    #[test]
    fn json_and_header_checks() {
        let h = headers();
        let view = ResponseView::new(200, 10, &h, r#"{"data":{"items":[{"id":7}]}}"#);
        assert!(evaluate(&Check::Json, &view).is_ok());
        assert!(evaluate(&Check::HasHeader("content-type".into()), &view).is_ok());
        assert!(evaluate(&Check::HasHeader("x-missing".into()), &view).is_err());
        assert!(evaluate(
            &Check::JsonProperty {
                path: vec!["data".into(), "items".into(), "0".into()],
                property: "id".into()
            },
            &view
        )
        .is_ok());
        assert_eq!(
            view.value_of(&ValueSource::Json(vec![
                "data".into(),
                "items".into(),
                "0".into(),
                "id".into()
            ])),
            Some("7".to_string())
        );
        assert_eq!(view.value_of(&ValueSource::Json(vec!["nope".into()])), None);
    }

    #[test]
    fn non_json_body_fails_json_check() {
        let h = vec![("Content-Type".to_string(), "text/html".to_string())];
        let view = ResponseView::new(200, 10, &h, "<html></html>");
        assert!(evaluate(&Check::Json, &view).is_err());
        assert!(evaluate(&Check::BodyIncludes("<html>".into()), &view).is_ok());
    }

    #[test]
    fn response_time_limit_is_exclusive() {
        let h = headers();
        let view = ResponseView::new(200, 500, &h, "");
        assert!(evaluate(&Check::ResponseTimeBelow(500.0), &view).is_err());
        assert!(evaluate(&Check::ResponseTimeBelow(501.0), &view).is_ok());
    }
}
