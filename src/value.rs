//! Dotted-path access over the generic value tree used for component data.
//!
//! Component data, configuration and action payloads are all plain JSON
//! documents, so the tree type is `serde_json::Value`. Lookups never fail
//! loudly: a missing segment yields [`Lookup::NotFound`], which the template
//! compiler uses to leave unresolved `{{tokens}}` visible in the output.

use serde_json::{Map, Value};

/// Result of resolving a dotted path against a value tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    NotFound,
}

impl<'a> Lookup<'a> {
    pub fn found(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// A parsed `a.b.0.c` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath {
    segments: Vec<String>,
}

impl ValuePath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.trim().split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walks the path. Arrays accept numeric segments; `null` intermediates
    /// and missing keys both end the walk with `NotFound`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Lookup<'a> {
        let mut current = root;
        for segment in &self.segments {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Lookup::NotFound,
            }
        }
        Lookup::Found(current)
    }
}

pub fn lookup<'a>(root: &'a Value, path: &str) -> Lookup<'a> {
    ValuePath::parse(path).resolve(root)
}

/// Loose truthiness: `false`, `0`, `""`, `null` and missing are falsy,
/// containers are always truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Text form of a scalar as it appears in markup. Strings are emitted raw,
/// everything else through its JSON form.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shallow merge: keys of `overlay` replace keys of `base`. A non-object
/// overlay leaves `base` untouched.
pub fn shallow_merge(base: &Value, overlay: &Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(extra) = overlay {
        for (key, value) in extra {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Returns a copy of `context` with `key` set, used for aliasing repeat items.
pub fn with_entry(context: &Value, key: &str, value: Value) -> Value {
    let mut map = match context {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    map.insert(key.to_string(), value);
    Value::Object(map)
}
