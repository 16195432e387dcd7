//! Variable scopes and `{{name}}` substitution.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use super::{read_json, value_to_string, CollectionError, Variable};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex"));

/// Substituted values may themselves contain placeholders.
const MAX_SUBSTITUTION_DEPTH: usize = 4;

/// An ordered set of key/value pairs, e.g. an environment file.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    pub name: String,
    values: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct VariableFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    values: Vec<VariableFileEntry>,
}

#[derive(Deserialize)]
struct VariableFileEntry {
    key: String,
    #[serde(default)]
    value: Value,
    #[serde(default = "enabled_default")]
    enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl VariableSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Load an environment or globals file. Disabled entries are dropped.
    pub fn load(path: &Path) -> Result<Self, CollectionError> {
        let file: VariableFile = read_json(path)?;
        let values = file
            .values
            .into_iter()
            .filter(|v| v.enabled)
            .map(|v| (v.key, value_to_string(&v.value)))
            .collect();
        Ok(Self {
            name: file.name,
            values,
        })
    }

    pub fn from_collection(vars: &[Variable]) -> Self {
        let mut set = Self::new("collection");
        for v in vars.iter().filter(|v| !v.disabled) {
            set.set(&v.key, value_to_string(&v.value));
        }
        set
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite, keeping first-insertion order.
    pub fn set(&mut self, key: &str, value: String) {
        match self.values.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.values.push((key.to_string(), value)),
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which scope a script writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Local,
    Environment,
    Collection,
    Global,
}

/// All scopes visible to a request, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub locals: VariableSet,
    pub environment: VariableSet,
    pub collection: VariableSet,
    pub globals: VariableSet,
}

impl Scope {
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.locals
            .get(key)
            .or_else(|| self.environment.get(key))
            .or_else(|| self.collection.get(key))
            .or_else(|| self.globals.get(key))
    }

    pub fn set(&mut self, kind: ScopeKind, key: &str, value: String) {
        let target = match kind {
            ScopeKind::Local => &mut self.locals,
            ScopeKind::Environment => &mut self.environment,
            ScopeKind::Collection => &mut self.collection,
            ScopeKind::Global => &mut self.globals,
        };
        target.set(key, value);
    }

    /// Replace every resolvable `{{name}}`; unknown placeholders stay as-is.
    pub fn substitute(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_SUBSTITUTION_DEPTH {
            if !current.contains("{{") {
                break;
            }
            let next = PLACEHOLDER
                .replace_all(&current, |caps: &Captures| match self.resolve(&caps[1]) {
                    Some(v) => v.to_string(),
                    None => caps[0].to_string(),
                })
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}
