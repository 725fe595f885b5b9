//! Tag sets
//!
//! One logical key/value mapping, projected on demand into the capitalized
//! (`Key`/`Value`) and lowercase (`key`/`value`) list forms providers expect.

use crate::value::{Mapping, Scalar, Value};
use nodeflow_cloud::Tag;
use serde::{Deserialize, Serialize};

/// Lowercase tag projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowerTag {
    pub key: String,
    pub value: String,
}

/// Ordered tag mapping; last write wins per key, first insertion fixes order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Merge another set on top of this one
    pub fn add(&mut self, other: &TagSet) {
        for (k, v) in &other.entries {
            self.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Capitalized projection
    pub fn api_tags(&self) -> Vec<Tag> {
        self.entries
            .iter()
            .map(|(k, v)| Tag::new(k.clone(), v.clone()))
            .collect()
    }

    /// Lowercase projection
    pub fn lower_tags(&self) -> Vec<LowerTag> {
        self.entries
            .iter()
            .map(|(k, v)| LowerTag {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    pub fn api_value(&self) -> Value {
        self.projection("Key", "Value")
    }

    pub fn lower_value(&self) -> Value {
        self.projection("key", "value")
    }

    fn projection(&self, key_field: &str, value_field: &str) -> Value {
        Value::Sequence(
            self.entries
                .iter()
                .map(|(k, v)| {
                    let mut m = Mapping::new();
                    m.insert(key_field.to_string(), Value::str(k.clone()));
                    m.insert(value_field.to_string(), Value::str(v.clone()));
                    Value::Mapping(m)
                })
                .collect(),
        )
    }

    /// Build from a mapping (`{Owner: ops}`) or a sequence of mappings
    /// (`[{Owner: ops}, {Env: prod}]`). Non-scalar tag values are rejected.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let mut tags = TagSet::new();
        match value {
            Value::Mapping(m) => tags.extend_mapping(m)?,
            Value::Sequence(items) => {
                for item in items {
                    let m = item
                        .as_mapping()
                        .ok_or_else(|| format!("tag entry must be a mapping, got {}", item.kind()))?;
                    tags.extend_mapping(m)?;
                }
            }
            Value::Scalar(Scalar::Null) => {}
            Value::Scalar(_) => return Err("tags must be a mapping or a sequence".to_string()),
        }
        Ok(tags)
    }

    fn extend_mapping(&mut self, m: &Mapping) -> Result<(), String> {
        for (k, v) in m {
            let scalar = v
                .as_scalar()
                .ok_or_else(|| format!("tag {k} has a non-scalar value"))?;
            self.insert(k.clone(), scalar.to_text());
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}
