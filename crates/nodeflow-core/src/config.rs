//! Config tree
//!
//! The loaded configuration document plus the typed projections derived
//! from it at load time (subnet definitions, tag set).

use crate::error::{CoreError, Result};
use crate::tags::TagSet;
use crate::value::{Mapping, Scalar, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level keys every configuration must define
pub const REQUIRED_KEYS: [&str; 5] = [
    "Bucket",
    "Region",
    "VPCCIDR",
    "AvailabilityZones",
    "SubnetTypes",
];

const DEFERRED_TAGGING_REGION_PREFIX: &str = "us-gov-";

/// One subnet type: a CIDR block and its subnet records
#[derive(Debug, Clone, PartialEq)]
pub struct SubnetDefinition {
    pub cidr: String,
    pub subnets: Vec<Value>,
}

/// Loaded configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: Mapping,
    subnet_types: BTreeMap<String, SubnetDefinition>,
    tags: TagSet,
    source: String,
}

impl ConfigTree {
    /// Parse and validate a configuration document
    pub fn from_yaml_str(text: &str, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let root = match Value::from_yaml_str(text)? {
            Value::Mapping(m) => m,
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "{source}: top level must be a mapping, got {}",
                    other.kind()
                )));
            }
        };

        for key in REQUIRED_KEYS {
            if root.get(key).is_none_or(Value::is_null) {
                return Err(CoreError::MissingConfig {
                    source_name: source.clone(),
                    key: key.to_string(),
                });
            }
        }

        let mut tree = Self::from_mapping(root);
        tree.source = source;
        tree.subnet_types = tree.parse_subnet_types()?;
        tree.project_tags()?;

        tracing::debug!(
            "Loaded configuration from {} ({} subnet types, {} tags)",
            tree.source,
            tree.subnet_types.len(),
            tree.tags.len()
        );
        Ok(tree)
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content, path.display().to_string())
    }

    /// Wrap a mapping without validation or projections
    pub fn from_mapping(root: Mapping) -> Self {
        Self {
            root,
            source: "<memory>".to_string(),
            ..Default::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key).filter(|v| !v.is_null())
    }

    /// A key that must hold a scalar
    pub fn scalar(&self, key: &str) -> Result<&Scalar> {
        match self.get(key) {
            None => Err(CoreError::UndefinedVariable(key.to_string())),
            Some(Value::Scalar(s)) => Ok(s),
            Some(other) => Err(CoreError::NonScalar {
                var: key.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// Text of an optional scalar key
    pub fn str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_scalar).map(Scalar::to_text)
    }

    /// Text of a required scalar key
    pub fn require_str(&self, key: &str) -> Result<String> {
        self.scalar(key).map(Scalar::to_text)
    }

    pub fn subnet_types(&self) -> &BTreeMap<String, SubnetDefinition> {
        &self.subnet_types
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Regions where tags cannot be sent with the create request
    pub fn defers_tagging(&self) -> bool {
        self.str("Region")
            .is_some_and(|r| r.starts_with(DEFERRED_TAGGING_REGION_PREFIX))
    }

    fn parse_subnet_types(&self) -> Result<BTreeMap<String, SubnetDefinition>> {
        let Some(types) = self.get("SubnetTypes").and_then(Value::as_mapping) else {
            return Err(CoreError::InvalidConfig(format!(
                "{}: SubnetTypes must be a mapping",
                self.source
            )));
        };

        types
            .iter()
            .map(|(name, def)| {
                let cidr = def
                    .get("CIDR")
                    .and_then(Value::as_scalar)
                    .map(Scalar::to_text)
                    .ok_or_else(|| {
                        CoreError::InvalidConfig(format!("subnet type {name} has no CIDR"))
                    })?;
                let subnets = def
                    .get("Subnets")
                    .and_then(Value::as_sequence)
                    .cloned()
                    .unwrap_or_default();
                Ok((name.clone(), SubnetDefinition { cidr, subnets }))
            })
            .collect()
    }

    fn project_tags(&mut self) -> Result<()> {
        if let Some(raw) = self.root.get("Tags") {
            self.tags = TagSet::from_value(raw)
                .map_err(|e| CoreError::InvalidConfig(format!("{}: Tags: {e}", self.source)))?;
        }
        self.root.insert("Tags".to_string(), self.tags.api_value());
        self.root.insert("tags".to_string(), self.tags.lower_value());
        Ok(())
    }
}
