//! Config tree values
//!
//! A closed tagged type for everything loaded from configuration and
//! template documents: scalars, ordered sequences and key-ordered mappings.

use serde::Serialize;
use std::collections::BTreeMap;

pub type Mapping = BTreeMap<String, Value>;

/// Leaf value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Text form used when a scalar is interpolated into a string
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness of flag-like parameters (`true` or the string `"true"`)
    pub fn is_true(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Str(s) => s == "true",
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Config tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Str(s.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn as_sequence(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Child of a mapping by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_mapping_mut().and_then(|m| m.get_mut(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Scalar(Scalar::Null))
    }

    /// JSON form handed to providers
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Scalar(Scalar::Null) => serde_json::Value::Null,
            Value::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Scalar(Scalar::Int(i)) => serde_json::Value::from(*i),
            Value::Scalar(Scalar::Float(f)) => serde_json::Value::from(*f),
            Value::Scalar(Scalar::Str(s)) => serde_json::Value::String(s.clone()),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Mapping(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        Ok(Value::from(raw))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(raw: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Y;
        match raw {
            Y::Null => Value::Scalar(Scalar::Null),
            Y::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            Y::Number(n) => match n.as_i64() {
                Some(i) => Value::Scalar(Scalar::Int(i)),
                None => Value::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            Y::String(s) => Value::Scalar(Scalar::Str(s)),
            Y::Sequence(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            Y::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (yaml_key(k), Value::from(v)))
                    .collect(),
            ),
            Y::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match Value::from(key) {
        Value::Scalar(s) => s.to_text(),
        other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
    }
}
