//! Selecting values out of expvar JSON and naming them

use agent_checks_base::{CheckError, CheckResult};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// One key of an [`ExpvarPath`]
#[derive(Debug, Clone)]
enum KeyMatcher {
    Exact(String),
    Any,
    Pattern(Regex),
}

impl KeyMatcher {
    fn parse(key: &str) -> CheckResult<Self> {
        if !key.is_empty() && key.chars().all(char::is_alphanumeric) {
            return Ok(Self::Exact(key.to_string()));
        }
        if key == "*" {
            return Ok(Self::Any);
        }
        Regex::new(&format!("^(?:{key})$"))
            .map(Self::Pattern)
            .map_err(|e| CheckError::configuration(format!("Invalid path key '{key}': {e}")))
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == key,
            Self::Any => true,
            Self::Pattern(re) => re.is_match(key),
        }
    }
}

/// A compiled slash-separated selector
///
/// Array elements are addressed by index, so `workers/1/busy` and
/// `workers/*/busy` both work.
#[derive(Debug, Clone)]
pub struct ExpvarPath {
    raw: String,
    keys: Vec<KeyMatcher>,
}

impl ExpvarPath {
    pub fn compile(path: &str) -> CheckResult<Self> {
        let keys = path
            .split('/')
            .map(KeyMatcher::parse)
            .collect::<CheckResult<Vec<_>>>()?;
        Ok(Self {
            raw: path.to_string(),
            keys,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Every value the path reaches, with the concrete keys leading to it
    pub fn resolve<'a>(&self, data: &'a Value) -> Vec<(Vec<String>, &'a Value)> {
        let mut found = Vec::new();
        descend(data, &self.keys, &mut Vec::new(), &mut found);
        found
    }
}

fn descend<'a>(
    content: &'a Value,
    keys: &[KeyMatcher],
    traversed: &mut Vec<String>,
    found: &mut Vec<(Vec<String>, &'a Value)>,
) {
    let Some((key, rest)) = keys.split_first() else {
        found.push((traversed.clone(), content));
        return;
    };
    let children: Vec<(String, &Value)> = match content {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        other => {
            debug!(traversed = %traversed.join("/"), value = %other, "cannot descend into scalar");
            return;
        }
    };
    for (name, child) in children {
        if key.matches(&name) {
            traversed.push(name);
            descend(child, rest, traversed, found);
            traversed.pop();
        }
    }
}

/// The numeric reading of an expvar value, if it has one
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

static FIRST_CAP_REGEX: OnceLock<Regex> = OnceLock::new();
static ALL_CAP_REGEX: OnceLock<Regex> = OnceLock::new();
static INVALID_CHARS_REGEX: OnceLock<Regex> = OnceLock::new();
static DOT_UNDERSCORE_REGEX: OnceLock<Regex> = OnceLock::new();
static REPEATED_UNDERSCORE_REGEX: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("Invalid metric name regex"))
}

/// `HeapAlloc` -> `heap_alloc`, keeping dots as separators
fn underscore_separated(name: &str) -> String {
    let name = regex(&FIRST_CAP_REGEX, r"(.)([A-Z][a-z]+)").replace_all(name, "${1}_${2}");
    let name = regex(&ALL_CAP_REGEX, r"([a-z0-9])([A-Z])")
        .replace_all(&name, "${1}_${2}")
        .to_lowercase();
    let name = regex(&INVALID_CHARS_REGEX, r"([^a-zA-Z0-9_.]+)|(^[^a-zA-Z]+)").replace_all(&name, "_");
    let name = regex(&REPEATED_UNDERSCORE_REGEX, r"__+").replace_all(&name, "_");
    let name = regex(&DOT_UNDERSCORE_REGEX, r"_*\._*").replace_all(&name, ".");
    name.trim_matches('_').to_string()
}

/// Metric name for a dotted expvar path under `namespace`
pub fn normalize(path: &str, namespace: &str) -> String {
    let name = underscore_separated(path);
    let namespace = underscore_separated(namespace);
    if namespace.is_empty() {
        name
    } else {
        format!("{namespace}.{name}")
    }
}
