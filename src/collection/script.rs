//! Declarative reading of collection scripts.
//!
//! Scripts are never executed. The common `pm.test(...)` assertion forms and
//! `pm.<scope>.set(...)` calls are recognised by pattern and turned into
//! [`Check`]s and [`Setter`]s that the runner evaluates natively.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::variables::ScopeKind;

static TEST_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"pm\.test\(\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)\s*,"#).unwrap()
});
static JSON_ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*pm\.response\.json\(\s*\)").unwrap()
});
static SETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)pm\.(environment|collectionVariables|globals|variables)\.set\(\s*["']([^"']+)["']\s*,\s*([^;\n]+?)\s*\)\s*;?\s*$"#,
    )
    .unwrap()
});

static STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pm\.response\.to\.have\.status\(\s*(\d{3})\s*\)").unwrap());
static BE_OK: Lazy<Regex> = Lazy::new(|| Regex::new(r"pm\.response\.to\.be\.ok\b").unwrap());
static BE_SUCCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pm\.response\.to\.be\.success\b").unwrap());
static BE_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pm\.response\.to\.be\.json\b|pm\.response\.to\.have\.jsonBody\(\s*\)").unwrap()
});
static HAS_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"pm\.response\.to\.have\.header\(\s*["']([^"']+)["']"#).unwrap()
});
static CODE_EQ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pm\.expect\(\s*pm\.response\.code\s*\)\.to\.(?:eql|equal|eq)\(\s*(\d{3})\s*\)")
        .unwrap()
});
static CODE_ONE_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pm\.expect\(\s*pm\.response\.code\s*\)\.to\.be\.oneOf\(\s*\[([^\]]*)\]\s*\)")
        .unwrap()
});
static TIME_BELOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"pm\.expect\(\s*pm\.response\.responseTime\s*\)\.to\.be\.(?:below|lessThan)\(\s*(\d+(?:\.\d+)?)\s*\)",
    )
    .unwrap()
});
static BODY_INCLUDES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"pm\.expect\(\s*pm\.response\.text\(\s*\)\s*\)\.to\.(?:include|contain)\(\s*(?:"([^"]*)"|'([^']*)')\s*\)"#,
    )
    .unwrap()
});
static HAS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"pm\.expect\(\s*([\w$.\[\]"'()]+?)\s*\)\.to\.have\.property\(\s*["']([^"']+)["']"#)
        .unwrap()
});

/// A single response check inside a `pm.test` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Status(u16),
    StatusOneOf(Vec<u16>),
    /// Exactly 200.
    Ok,
    /// Any 2xx.
    Success,
    Json,
    HasHeader(String),
    ResponseTimeBelow(f64),
    BodyIncludes(String),
    /// The JSON value at `path` has the key `property`.
    JsonProperty { path: Vec<String>, property: String },
}

/// A named `pm.test` block and the checks recognised in it.
#[derive(Debug, Clone, PartialEq)]
pub struct TestBlock {
    pub name: String,
    pub checks: Vec<Check>,
}

/// Where a setter takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal(String),
    /// A path into the JSON response body.
    Json(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setter {
    pub scope: ScopeKind,
    pub key: String,
    pub value: ValueSource,
}

/// Everything recognised in one script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptPlan {
    pub tests: Vec<TestBlock>,
    pub setters: Vec<Setter>,
}

impl ScriptPlan {
    pub fn parse(source: &str) -> Self {
        let aliases: HashSet<String> = JSON_ALIAS
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();

        let mut tests = Vec::new();
        for caps in TEST_START.captures_iter(source) {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let Some(end) = caps.get(0).map(|m| m.end()) else {
                continue;
            };
            let body = source[end..]
                .find('{')
                .map(|offset| block_body(source, end + offset))
                .unwrap_or("");
            tests.push(TestBlock {
                name,
                checks: parse_checks(body, &aliases),
            });
        }

        let setters = SETTER
            .captures_iter(source)
            .filter_map(|caps| {
                let scope = match &caps[1] {
                    "environment" => ScopeKind::Environment,
                    "collectionVariables" => ScopeKind::Collection,
                    "globals" => ScopeKind::Global,
                    _ => ScopeKind::Local,
                };
                let key = caps[2].to_string();
                match parse_value(&caps[3], &aliases) {
                    Some(value) => Some(Setter { scope, key, value }),
                    None => {
                        tracing::warn!(%key, expr = &caps[3], "unsupported variable expression in script");
                        None
                    }
                }
            })
            .collect();

        Self { tests, setters }
    }

    /// Merge the plans of several scripts, keeping order.
    pub fn parse_all(sources: &[String]) -> Self {
        let mut plan = Self::default();
        for source in sources {
            let next = Self::parse(source);
            plan.tests.extend(next.tests);
            plan.setters.extend(next.setters);
        }
        plan
    }
}

/// Text between the brace at `open` and its matching close brace, or the
/// rest of the source when the block is never closed.
fn block_body(source: &str, open: usize) -> &str {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = source[open..].char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut star = false;
                for (_, c) in chars.by_ref() {
                    if star && c == '/' {
                        break;
                    }
                    star = c == '*';
                }
            }
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &source[open + 1..open + i];
                }
            }
            _ => {}
        }
    }
    &source[(open + 1).min(source.len())..]
}

fn parse_checks(body: &str, aliases: &HashSet<String>) -> Vec<Check> {
    // Collected with their offsets so the order matches the source.
    let mut found: Vec<(usize, Check)> = Vec::new();

    for c in STATUS.captures_iter(body).chain(CODE_EQ.captures_iter(body)) {
        if let (Some(m), Ok(code)) = (c.get(0), c[1].parse()) {
            found.push((m.start(), Check::Status(code)));
        }
    }
    for c in CODE_ONE_OF.captures_iter(body) {
        let codes: Vec<u16> = c[1]
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        if let Some(m) = c.get(0) {
            found.push((m.start(), Check::StatusOneOf(codes)));
        }
    }
    for m in BE_OK.find_iter(body) {
        found.push((m.start(), Check::Ok));
    }
    for m in BE_SUCCESS.find_iter(body) {
        found.push((m.start(), Check::Success));
    }
    for m in BE_JSON.find_iter(body) {
        found.push((m.start(), Check::Json));
    }
    for c in HAS_HEADER.captures_iter(body) {
        if let Some(m) = c.get(0) {
            found.push((m.start(), Check::HasHeader(c[1].to_string())));
        }
    }
    for c in TIME_BELOW.captures_iter(body) {
        if let (Some(m), Ok(limit)) = (c.get(0), c[1].parse()) {
            found.push((m.start(), Check::ResponseTimeBelow(limit)));
        }
    }
    for c in BODY_INCLUDES.captures_iter(body) {
        let text = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str());
        if let (Some(m), Some(text)) = (c.get(0), text) {
            found.push((m.start(), Check::BodyIncludes(text.to_string())));
        }
    }
    for c in HAS_PROPERTY.captures_iter(body) {
        if let (Some(m), Some(path)) = (c.get(0), parse_json_ref(&c[1], aliases)) {
            found.push((
                m.start(),
                Check::JsonProperty {
                    path,
                    property: c[2].to_string(),
                },
            ));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);
    found.into_iter().map(|(_, check)| check).collect()
}

fn parse_value(expr: &str, aliases: &HashSet<String>) -> Option<ValueSource> {
    let expr = expr.trim();
    for q in ['"', '\'', '`'] {
        if expr.len() >= 2 && expr.starts_with(q) && expr.ends_with(q) {
            return Some(ValueSource::Literal(expr[1..expr.len() - 1].to_string()));
        }
    }
    if expr.parse::<f64>().is_ok() || expr == "true" || expr == "false" {
        return Some(ValueSource::Literal(expr.to_string()));
    }
    parse_json_ref(expr, aliases).map(ValueSource::Json)
}

/// Parse `pm.response.json().a[0]["b"]` or `alias.a.b` into path segments.
fn parse_json_ref(expr: &str, aliases: &HashSet<String>) -> Option<Vec<String>> {
    let expr = expr.trim();
    let rest = if let Some(rest) = expr.strip_prefix("pm.response.json()") {
        rest
    } else {
        let ident_end = expr
            .find(|c: char| c == '.' || c == '[')
            .unwrap_or(expr.len());
        if !aliases.contains(&expr[..ident_end]) {
            return None;
        }
        &expr[ident_end..]
    };
    parse_path(rest)
}

fn parse_path(mut rest: &str) -> Option<Vec<String>> {
    let mut path = Vec::new();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let end = tail
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(tail.len());
            let segment = &tail[..end];
            if segment.is_empty() || !segment.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                return None;
            }
            path.push(segment.to_string());
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = tail.find(']')?;
            let segment = tail[..end].trim().trim_matches(|c: char| c == '"' || c == '\'');
            path.push(segment.to_string());
            rest = &tail[end + 1..];
        } else {
            return None;
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_time_checks() {
        let src = r#"
pm.test("Status code is 200", function () {
    pm.response.to.have.status(200);
});
pm.test('Fast enough', () => {
    pm.expect(pm.response.responseTime).to.be.below(500);
});
"#;
        let plan = ScriptPlan::parse(src);
        assert_eq!(plan.tests.len(), 2);
        assert_eq!(plan.tests[0].name, "Status code is 200");
        assert_eq!(plan.tests[0].checks, vec![Check::Status(200)]);
        assert_eq!(plan.tests[1].name, "Fast enough");
        assert_eq!(plan.tests[1].checks, vec![Check::ResponseTimeBelow(500.0)]);
    }

    #[test]
    fn checks_keep_source_order() {
        let src = r#"
pm.test("Mixed", function () {
    pm.response.to.have.header("Content-Type");
    pm.expect(pm.response.code).to.be.oneOf([200, 201]);
    pm.response.to.be.json;
});
"#;
        let plan = ScriptPlan::parse(src);
        assert_eq!(
            plan.tests[0].checks,
            vec![
                Check::HasHeader("Content-Type".to_string()),
                Check::StatusOneOf(vec![200, 201]),
                Check::Json,
            ]
        );
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_block() {
        let src = r#"
pm.test("Body", function () {
    pm.expect(pm.response.text()).to.include("}");
    pm.response.to.be.success;
});
"#;
        let plan = ScriptPlan::parse(src);
        assert_eq!(
            plan.tests[0].checks,
            vec![Check::BodyIncludes("}".to_string()), Check::Success]
        );
    }

    #[test]
    fn apostrophes_in_comments_do_not_open_strings() {
        let src = "pm.test(\"Status code is 200\", function () {\n    // make sure it's ok\n    pm.response.to.have.status(200);\n});\npm.test(\"Json\", function () {\n    /* don't { */ pm.response.to.be.json;\n});";
        let plan = ScriptPlan::parse(src);
        assert_eq!(plan.tests.len(), 2);
        assert_eq!(plan.tests[0].checks, vec![Check::Status(200)]);
        assert_eq!(plan.tests[1].checks, vec![Check::Json]);
    }

    #[test]
    fn unclosed_block_still_yields_its_checks() {
        let src = "pm.test(\"Status code is 200\", function () {\n    pm.response.to.have.status(200);\n";
        let plan = ScriptPlan::parse(src);
        assert_eq!(plan.tests[0].checks, vec![Check::Status(200)]);
    }

    #[test]
    fn json_property_through_alias() {
        let src = r#"
var jsonData = pm.response.json();
pm.test("Has token", function () {
    pm.expect(jsonData.data).to.have.property("token");
});
pm.test("Has id", function () {
    pm.expect(pm.response.json()).to.have.property('id');
});
"#;
        let plan = ScriptPlan::parse(src);
        assert_eq!(
            plan.tests[0].checks,
            vec![Check::JsonProperty {
                path: vec!["data".to_string()],
                property: "token".to_string()
            }]
        );
        assert_eq!(
            plan.tests[1].checks,
            vec![Check::JsonProperty {
                path: vec![],
                property: "id".to_string()
            }]
        );
    }

    #[test]
    fn unrecognised_test_has_no_checks() {
        let plan = ScriptPlan::parse(r#"pm.test("custom", function () { console.log(1); });"#);
        assert_eq!(plan.tests.len(), 1);
        assert!(plan.tests[0].checks.is_empty());
    }

    #[test]
    fn parses_setters() {
        let src = r#"
const body = pm.response.json();
pm.environment.set("token", body.auth.token);
pm.collectionVariables.set("firstId", pm.response.json().items[0].id);
pm.globals.set("mode", "test");
pm.variables.set("count", 3);
pm.environment.set("weird", Math.random());
"#;
        let plan = ScriptPlan::parse(src);
        assert_eq!(plan.setters.len(), 4);
        assert_eq!(
            plan.setters[0],
            Setter {
                scope: ScopeKind::Environment,
                key: "token".to_string(),
                value: ValueSource::Json(vec!["auth".to_string(), "token".to_string()]),
            }
        );
        assert_eq!(
            plan.setters[1].value,
            ValueSource::Json(vec!["items".to_string(), "0".to_string(), "id".to_string()])
        );
        assert_eq!(plan.setters[1].scope, ScopeKind::Collection);
        assert_eq!(plan.setters[2].value, ValueSource::Literal("test".to_string()));
        assert_eq!(plan.setters[3].scope, ScopeKind::Local);
        assert_eq!(plan.setters[3].value, ValueSource::Literal("3".to_string()));
    }
}
