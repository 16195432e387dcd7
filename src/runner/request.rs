//! Turning a collection request into an HTTP request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::warn;

use crate::collection::variables::Scope;
use crate::collection::{Auth, Body, RequestItem};
use crate::summary::{ExecutedRequest, KeyValue};

/// A built request plus the resolved form recorded in the report.
pub struct Prepared {
    pub request: reqwest::Request,
    pub record: ExecutedRequest,
}

/// Resolve variables and build the request. The error is a message for the
/// execution record.
pub fn prepare(client: &Client, item: &RequestItem, scope: &Scope) -> Result<Prepared, (ExecutedRequest, String)> {
    let method_name = item.request.method.to_uppercase();
    let raw_url = scope.substitute(&item.request.url.to_raw());
    let url_text = with_scheme(&raw_url);

    let mut record = ExecutedRequest {
        method: method_name.clone(),
        url: url_text.clone(),
        headers: Vec::new(),
        body: None,
    };

    let method = match Method::from_bytes(method_name.as_bytes()) {
        Ok(m) => m,
        Err(e) => return Err((record, format!("invalid method {}: {}", method_name, e))),
    };
    let mut url = match reqwest::Url::parse(&url_text) {
        Ok(u) => u,
        Err(e) => return Err((record, format!("invalid url {}: {}", url_text, e))),
    };

    let mut headers = reqwest::header::HeaderMap::new();
    for header in item.request.header.iter().filter(|h| !h.disabled) {
        let key = scope.substitute(&header.key);
        let value = scope.substitute(&header.value);
        insert_header(&mut headers, &key, &value);
    }

    if let Some(auth) = &item.auth {
        apply_auth(auth, scope, &mut headers, &mut url);
    }
    record.url = url.to_string();

    let mut builder = client.request(method, url);

    if let Some(body) = item.request.body.as_ref().filter(|b| !b.disabled) {
        let (next, text) = apply_body(builder, body, scope, &mut headers);
        builder = next;
        record.body = text;
    }

    builder = builder.headers(headers);
    let request = match builder.build() {
        Ok(r) => r,
        Err(e) => return Err((record, format!("failed to build request: {}", e))),
    };

    record.headers = request
        .headers()
        .iter()
        .map(|(k, v)| KeyValue::new(k.as_str(), String::from_utf8_lossy(v.as_bytes())))
        .collect();

    Ok(Prepared { request, record })
}

/// Schemeless URLs default to plain HTTP.
fn with_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

fn insert_header(headers: &mut reqwest::header::HeaderMap, key: &str, value: &str) {
    match (
        HeaderName::from_bytes(key.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(val)) => {
            headers.append(name, val);
        }
        _ => warn!(header = %key, "skipping invalid header"),
    }
}

fn apply_auth(auth: &Auth, scope: &Scope, headers: &mut reqwest::header::HeaderMap, url: &mut reqwest::Url) {
    let attr = |key: &str| {
        auth.attribute(key)
            .map(|v| scope.substitute(&v))
            .unwrap_or_default()
    };

    match auth.kind.as_str() {
        "bearer" => {
            insert_header(headers, "Authorization", &format!("Bearer {}", attr("token")));
        }
        "basic" => {
            let credentials = format!("{}:{}", attr("username"), attr("password"));
            insert_header(
                headers,
                "Authorization",
                &format!("Basic {}", STANDARD.encode(credentials.as_bytes())),
            );
        }
        "apikey" => {
            let key = attr("key");
            let value = attr("value");
            if attr("in") == "query" {
                url.query_pairs_mut().append_pair(&key, &value);
            } else {
                insert_header(headers, &key, &value);
            }
        }
        other => warn!(auth = %other, "unsupported auth type, sending without auth"),
    }
}

fn apply_body(
    builder: reqwest::RequestBuilder,
    body: &Body,
    scope: &Scope,
    headers: &mut reqwest::header::HeaderMap,
) -> (reqwest::RequestBuilder, Option<String>) {
    match body.mode.as_str() {
        "raw" => {
            let text = scope.substitute(body.raw.as_deref().unwrap_or_default());
            if !headers.contains_key(CONTENT_TYPE) {
                let content_type = match body.raw_language() {
                    Some("json") => Some("application/json"),
                    Some("xml") => Some("application/xml"),
                    Some("text") => Some("text/plain"),
                    _ => None,
                };
                if let Some(ct) = content_type {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
                }
            }
            (builder.body(text.clone()), Some(text))
        }
        "urlencoded" => {
            let pairs: Vec<(String, String)> = body
                .urlencoded
                .iter()
                .filter(|p| !p.disabled)
                .map(|p| {
                    (
                        scope.substitute(&p.key),
                        scope.substitute(p.value.as_deref().unwrap_or_default()),
                    )
                })
                .collect();
            let text = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            (builder.form(&pairs), Some(text))
        }
        "formdata" => {
            let mut form = reqwest::multipart::Form::new();
            let mut lines = Vec::new();
            for param in body.formdata.iter().filter(|p| !p.disabled) {
                if param.kind.as_deref() == Some("file") {
                    warn!(field = %param.key, "file form fields are not sent");
                    continue;
                }
                let key = scope.substitute(&param.key);
                let value = scope.substitute(param.value.as_deref().unwrap_or_default());
                lines.push(format!("{}: {}", key, value));
                form = form.text(key, value);
            }
            // The boundary lives in the generated content type.
            headers.remove(CONTENT_TYPE);
            (builder.multipart(form), Some(lines.join("\n")))
        }
        _ => (builder, None),
    }
}
