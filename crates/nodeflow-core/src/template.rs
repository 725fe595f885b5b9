//! Templates
//!
//! Templates are YAML documents addressed by class (`node`, `dns`) and name.
//! Raw text is fetched from a [`TemplateSource`] and memoized per session by
//! [`TemplateCache`]; string expansion runs on every load since parameters
//! differ between invocations.

use crate::error::{CoreError, Result};
use crate::resolve::{Resolver, normalize_keys};
use crate::value::{Scalar, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Node templates
pub const NODE_CLASS: &str = "node";
/// DNS change templates
pub const DNS_CLASS: &str = "dns";

const TEMPLATE_EXTENSION: &str = "yaml";

const ARECORD_TEMPLATE: &str = r#"hosted_zone_id: ${@zone_id}
change_batch:
  comment: "A record for ${@fqdn}"
  changes:
    - action: UPSERT
      resource_record_set:
        name: ${@fqdn}
        type: A
        ttl: ${@ttl:300}
        resource_records:
          - value: ${@ipaddr}
"#;

const DELETE_TEMPLATE: &str = r#"hosted_zone_id: ${@zone_id}
change_batch:
  comment: "Remove A record for ${@fqdn}"
  changes:
    - action: DELETE
      resource_record_set:
        name: ${@fqdn}
        type: A
        ttl: ${@ttl:300}
        resource_records:
          - value: ${@ipaddr}
"#;

/// Built-in templates used when no directory provides one
fn embedded(class: &str, name: &str) -> Option<&'static str> {
    match (class, name) {
        (DNS_CLASS, "arec") => Some(ARECORD_TEMPLATE),
        (DNS_CLASS, "delete") => Some(DELETE_TEMPLATE),
        _ => None,
    }
}

fn embedded_names(class: &str) -> &'static [&'static str] {
    match class {
        DNS_CLASS => &["arec", "delete"],
        _ => &[],
    }
}

/// Where raw template text comes from
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch(&self, class: &str, name: &str) -> Result<String>;

    /// Template names available for `class`, sorted
    async fn list(&self, class: &str) -> Result<Vec<String>>;
}

/// Reads `<dir>/<class>/<name>.yaml`, first directory wins
#[derive(Debug, Clone, Default)]
pub struct DirTemplateSource {
    dirs: Vec<PathBuf>,
}

impl DirTemplateSource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

#[async_trait]
impl TemplateSource for DirTemplateSource {
    async fn fetch(&self, class: &str, name: &str) -> Result<String> {
        for dir in &self.dirs {
            let path = dir.join(class).join(format!("{name}.{TEMPLATE_EXTENSION}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    tracing::debug!("Loaded template {}", path.display());
                    return Ok(text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CoreError::IoError {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        embedded(class, name)
            .map(str::to_string)
            .ok_or_else(|| CoreError::TemplateNotFound {
                class: class.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(&self, class: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = embedded_names(class)
            .iter()
            .map(|n| n.to_string())
            .collect();

        for dir in &self.dirs {
            let class_dir = dir.join(class);
            let mut entries = match tokio::fs::read_dir(&class_dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CoreError::IoError {
                        path: class_dir,
                        message: e.to_string(),
                    });
                }
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::IoError {
                path: class_dir.clone(),
                message: e.to_string(),
            })? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION)
                    && let Some(stem) = path.file_stem()
                {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Session-scoped memo of raw template text
pub struct TemplateCache {
    source: Arc<dyn TemplateSource>,
    raw: Mutex<HashMap<(String, String), Arc<str>>>,
}

impl TemplateCache {
    pub fn new(source: Arc<dyn TemplateSource>) -> Self {
        Self {
            source,
            raw: Mutex::new(HashMap::new()),
        }
    }

    pub async fn raw(&self, class: &str, name: &str) -> Result<Arc<str>> {
        let key = (class.to_string(), name.to_string());
        if let Some(text) = self.raw.lock().await.get(&key) {
            return Ok(text.clone());
        }

        let text: Arc<str> = self.source.fetch(class, name).await?.into();
        self.raw.lock().await.insert(key, text.clone());
        Ok(text)
    }

    pub async fn list(&self, class: &str) -> Result<Vec<String>> {
        self.source.list(class).await
    }

    /// Fetch, expand `${...}` markers and parse
    pub async fn load(&self, resolver: &Resolver<'_>, class: &str, name: &str) -> Result<Value> {
        let raw = self.raw(class, name).await?;
        let expanded = resolver.expand_strings(&raw).await?;
        Value::from_yaml_str(&expanded).map_err(|e| CoreError::InvalidTemplate {
            name: format!("{class}/{name}"),
            message: e.to_string(),
        })
    }
}

/// A parsed node template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    /// Launch request, keys in snake_case
    pub request: Value,
    pub tags: Option<Value>,
    pub metadata: Option<Value>,
    /// Launch into a security group of its own
    pub private_sg: bool,
    /// Extra network interfaces attached after launch, keys in snake_case
    pub additional_interfaces: Vec<Value>,
}

impl Template {
    pub fn from_value(name: &str, value: Value) -> Result<Self> {
        let invalid = |message: String| CoreError::InvalidTemplate {
            name: name.to_string(),
            message,
        };

        let Value::Mapping(mut doc) = value else {
            return Err(invalid("document must be a mapping".to_string()));
        };

        let mut request = doc
            .remove("api_template")
            .filter(|v| !v.is_null())
            .ok_or_else(|| invalid("missing api_template section".to_string()))?;
        if request.as_mapping().is_none() {
            return Err(invalid(format!(
                "api_template must be a mapping, got {}",
                request.kind()
            )));
        }
        normalize_keys(&mut request);

        let private_sg = match doc.remove("private_sg") {
            None | Some(Value::Scalar(Scalar::Null)) => false,
            Some(Value::Scalar(s)) => s.is_true(),
            Some(other) => {
                return Err(invalid(format!(
                    "private_sg must be a boolean, got {}",
                    other.kind()
                )));
            }
        };

        let additional_interfaces = match doc.remove("additional_interfaces") {
            None | Some(Value::Scalar(Scalar::Null)) => Vec::new(),
            Some(Value::Sequence(mut items)) => {
                items.iter_mut().for_each(normalize_keys);
                items
            }
            Some(other) => {
                return Err(invalid(format!(
                    "additional_interfaces must be a sequence, got {}",
                    other.kind()
                )));
            }
        };

        Ok(Self {
            name: name.to_string(),
            request,
            tags: doc.remove("tags").filter(|v| !v.is_null()),
            metadata: doc.remove("metadata").filter(|v| !v.is_null()),
            private_sg,
            additional_interfaces,
        })
    }
}
