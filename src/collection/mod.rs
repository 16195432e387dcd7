//! Postman v2.1 collection model and loading.
//!
//! Only the parts of the format the runner acts on are modelled. Unknown
//! fields are ignored so exported collections load without modification.

pub mod script;
pub mod variables;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read and deserialize a JSON document from `path`.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CollectionError> {
    let content = std::fs::read_to_string(path).map_err(|source| CollectionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CollectionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub info: Info,
    #[serde(default)]
    pub item: Vec<Item>,
    #[serde(default)]
    pub variable: Vec<Variable>,
    #[serde(default)]
    pub event: Vec<Event>,
    #[serde(default)]
    pub auth: Option<Auth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<Description>,
}

/// Descriptions are either plain text or `{ "content": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Object {
        #[serde(default)]
        content: String,
    },
}

impl Description {
    pub fn text(&self) -> &str {
        match self {
            Description::Text(s) => s,
            Description::Object { content } => content,
        }
    }
}

/// A folder (has `item`) or a request (has `request`).
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<Description>,
    #[serde(default)]
    pub item: Option<Vec<Item>>,
    #[serde(default)]
    pub request: Option<RequestSpec>,
    #[serde(default)]
    pub event: Vec<Event>,
    #[serde(default)]
    pub auth: Option<Auth>,
}

/// A request may be shortened to its URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RequestSpec {
    Url(String),
    Detailed(Request),
}

impl RequestSpec {
    pub fn into_request(self) -> Request {
        match self {
            RequestSpec::Url(raw) => Request {
                method: default_method(),
                url: Url::Raw(raw),
                header: Vec::new(),
                body: None,
                auth: None,
                description: None,
            },
            RequestSpec::Detailed(req) => req,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: Url,
    #[serde(default)]
    pub header: Vec<Header>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub description: Option<Description>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Url {
    Raw(String),
    Parts(UrlParts),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlParts {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub host: Option<Segments>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub path: Option<Segments>,
    #[serde(default)]
    pub query: Vec<QueryParam>,
}

/// `host` and `path` are either a joined string or a list of segments.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Segments {
    Joined(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Url {
    /// The unresolved URL text, placeholders included.
    pub fn to_raw(&self) -> String {
        match self {
            Url::Raw(raw) => raw.clone(),
            Url::Parts(parts) => parts.to_raw(),
        }
    }
}

impl UrlParts {
    fn to_raw(&self) -> String {
        let has_parts = self.host.is_some() || self.path.is_some();
        if !has_parts {
            return self.raw.clone().unwrap_or_default();
        }

        let mut out = String::new();
        if let Some(protocol) = &self.protocol {
            out.push_str(protocol);
            out.push_str("://");
        }
        match &self.host {
            Some(Segments::Joined(h)) => out.push_str(h),
            Some(Segments::List(hs)) => out.push_str(&hs.join(".")),
            None => {}
        }
        if let Some(port) = &self.port {
            out.push(':');
            out.push_str(port);
        }
        match &self.path {
            Some(Segments::Joined(p)) => {
                if !p.starts_with('/') {
                    out.push('/');
                }
                out.push_str(p);
            }
            Some(Segments::List(ps)) => {
                for segment in ps {
                    out.push('/');
                    out.push_str(segment);
                }
            }
            None => {}
        }

        let query: Vec<String> = self
            .query
            .iter()
            .filter(|q| !q.disabled)
            .filter_map(|q| {
                let key = q.key.as_deref()?;
                Some(match &q.value {
                    Some(v) => format!("{}={}", key, v),
                    None => key.to_string(),
                })
            })
            .collect();
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query.join("&"));
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub urlencoded: Vec<FormParam>,
    #[serde(default)]
    pub formdata: Vec<FormParam>,
    #[serde(default)]
    pub options: Option<BodyOptions>,
    #[serde(default)]
    pub disabled: bool,
}

impl Body {
    /// Language of a raw body, e.g. `json`.
    pub fn raw_language(&self) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.raw.as_ref())
            .and_then(|r| r.language.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodyOptions {
    #[serde(default)]
    pub raw: Option<RawOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormParam {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub bearer: Vec<AuthAttribute>,
    #[serde(default)]
    pub basic: Vec<AuthAttribute>,
    #[serde(default)]
    pub apikey: Vec<AuthAttribute>,
}

impl Auth {
    /// Look up an attribute of the active auth type.
    pub fn attribute(&self, key: &str) -> Option<String> {
        let attrs = match self.kind.as_str() {
            "bearer" => &self.bearer,
            "basic" => &self.basic,
            "apikey" => &self.apikey,
            _ => return None,
        };
        attrs
            .iter()
            .find(|a| a.key == key)
            .map(|a| value_to_string(&a.value))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub listen: String,
    #[serde(default)]
    pub script: Option<Script>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub exec: Option<Exec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Exec {
    Single(String),
    Lines(Vec<String>),
}

impl Event {
    fn source(&self) -> Option<String> {
        if self.disabled {
            return None;
        }
        match self.script.as_ref()?.exec.as_ref()? {
            Exec::Single(s) => Some(s.clone()),
            Exec::Lines(lines) => Some(lines.join("\n")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variable {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub disabled: bool,
}

/// Render a JSON scalar the way it is substituted into text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// A request with everything it inherits from enclosing folders resolved.
#[derive(Debug, Clone)]
pub struct RequestItem {
    pub id: String,
    pub name: String,
    /// Enclosing folder names, outermost first.
    pub folders: Vec<String>,
    /// Description of the innermost enclosing folder.
    pub folder_description: Option<String>,
    pub request: Request,
    /// Effective auth after inheritance; `None` means no auth.
    pub auth: Option<Auth>,
    pub prerequest: Vec<String>,
    pub tests: Vec<String>,
}

impl Collection {
    pub fn load(path: &Path) -> Result<Self, CollectionError> {
        read_json(path)
    }

    /// All requests in execution order (depth-first).
    pub fn requests(&self) -> Vec<RequestItem> {
        let mut out = Vec::new();
        let scope = Inherited {
            folders: Vec::new(),
            folder_description: None,
            auth: self.auth.clone(),
            events: self.event.clone(),
        };
        for (index, item) in self.item.iter().enumerate() {
            flatten(item, &scope, &index.to_string(), &mut out);
        }
        out
    }
}

#[derive(Clone)]
struct Inherited {
    folders: Vec<String>,
    folder_description: Option<String>,
    auth: Option<Auth>,
    events: Vec<Event>,
}

fn effective_auth(own: Option<&Auth>, parent: &Option<Auth>) -> Option<Auth> {
    match own {
        Some(a) if a.kind == "inherit" => parent.clone(),
        Some(a) if a.kind == "noauth" => None,
        Some(a) => Some(a.clone()),
        None => parent.clone(),
    }
}

fn scripts(events: &[Event], listen: &str) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.listen == listen)
        .filter_map(Event::source)
        .collect()
}

fn flatten(item: &Item, parent: &Inherited, path: &str, out: &mut Vec<RequestItem>) {
    let mut events = parent.events.clone();
    events.extend(item.event.iter().cloned());

    if let Some(children) = &item.item {
        let mut folders = parent.folders.clone();
        folders.push(item.name.clone());
        let scope = Inherited {
            folders,
            folder_description: item.description.as_ref().map(|d| d.text().to_string()),
            auth: effective_auth(item.auth.as_ref(), &parent.auth),
            events,
        };
        for (index, child) in children.iter().enumerate() {
            flatten(child, &scope, &format!("{}.{}", path, index), out);
        }
        return;
    }

    let Some(spec) = item.request.clone() else {
        tracing::debug!(name = %item.name, "skipping item without request");
        return;
    };
    let request = spec.into_request();
    let item_auth = request.auth.as_ref().or(item.auth.as_ref());
    let auth = effective_auth(item_auth, &parent.auth);

    out.push(RequestItem {
        id: item.id.clone().unwrap_or_else(|| path.to_string()),
        name: item.name.clone(),
        folders: parent.folders.clone(),
        folder_description: parent.folder_description.clone(),
        auth,
        prerequest: scripts(&events, "prerequest"),
        tests: scripts(&events, "test"),
        request,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> &'static str {
        r#"
        {
          "info": { "name": "Shop", "description": { "content": "Shop API" } },
          "auth": { "type": "bearer", "bearer": [ { "key": "token", "value": "{{token}}" } ] },
          "event": [ { "listen": "test", "script": { "exec": ["// collection"] } } ],
          "item": [
            {
              "name": "Auth",
              "description": "Login flow",
              "auth": { "type": "noauth" },
              "item": [
                {
                  "name": "Login",
                  "request": {
                    "method": "POST",
                    "url": { "raw": "{{base}}/login", "host": ["{{base}}"], "path": ["login"] }
                  },
                  "event": [ { "listen": "test", "script": { "exec": ["pm.test('ok', () => {", "});"] } } ]
                }
              ]
            },
            { "name": "Products", "request": "{{base}}/products" },
            { "name": "Empty" }
          ]
        }
        "#
    }

    #[test]
    fn flattens_in_depth_first_order() {
        let collection: Collection = serde_json::from_str(fixture()).unwrap();
        let items = collection.requests();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Login");
        assert_eq!(items[0].folders, vec!["Auth".to_string()]);
        assert_eq!(items[0].folder_description.as_deref(), Some("Login flow"));
        assert_eq!(items[1].name, "Products");
        assert_eq!(items[1].request.method, "GET");
        assert_eq!(items[1].id, "1");
    }

    #[test]
    fn auth_is_inherited_unless_disabled() {
        let collection: Collection = serde_json::from_str(fixture()).unwrap();
        let items = collection.requests();
        assert!(items[0].auth.is_none());
        let auth = items[1].auth.as_ref().unwrap();
        assert_eq!(auth.kind, "bearer");
        assert_eq!(auth.attribute("token").as_deref(), Some("{{token}}"));
    }

    #[test]
    fn scripts_accumulate_from_collection_down() {
        let collection: Collection = serde_json::from_str(fixture()).unwrap();
        let items = collection.requests();
        assert_eq!(items[0].tests.len(), 2);
        assert_eq!(items[0].tests[0], "// collection");
        assert!(items[0].tests[1].contains("pm.test('ok'"));
        assert_eq!(items[1].tests.len(), 1);
    }

    #[test]
    fn url_parts_rebuild_without_disabled_query() {
        let parts = UrlParts {
            raw: None,
            protocol: Some("https".to_string()),
            host: Some(Segments::List(vec!["api".into(), "example".into(), "com".into()])),
            port: Some("8443".to_string()),
            path: Some(Segments::List(vec!["v1".into(), "items".into()])),
            query: vec![
                QueryParam { key: Some("page".into()), value: Some("2".into()), disabled: false },
                QueryParam { key: Some("debug".into()), value: Some("1".into()), disabled: true },
            ],
        };
        assert_eq!(
            Url::Parts(parts).to_raw(),
            "https://api.example.com:8443/v1/items?page=2"
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Collection::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, CollectionError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
