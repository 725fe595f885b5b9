//! Variable resolution
//!
//! Two independent passes:
//!
//! ```text
//!   raw template text
//!        │  expand_strings   ${@param[:default]} ${=stack[:child]:Output}
//!        │                   ${%record} ${ConfigKey}
//!        ▼
//!   parsed Value tree
//!        │  resolve_vars     "$@param" "$%record" "$ConfigKey" ("$$x" → "$x")
//!        ▼
//!   normalize_keys           CamelCase / kebab-case keys → snake_case
//! ```
//!
//! Pass A only ever substitutes text and insists on scalars. Pass B replaces
//! whole values in place and accepts any config value, including sequences
//! and mappings.

use crate::config::ConfigTree;
use crate::error::{CoreError, Result};
use crate::outputs::OutputCache;
use crate::params::ParamStore;
use crate::value::{Scalar, Value};
use futures_util::future::{BoxFuture, FutureExt};
use nodeflow_cloud::{DnsFacade, DnsZone};
use regex::Regex;
use std::sync::LazyLock;

static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([@=:%$\w.\-/]+)\}").expect("reference pattern"));

const QUOTE: char = '"';

/// Resolution context over one config tree and one parameter store
///
/// Stack-output and DNS references need the corresponding providers; without
/// them those references fail with [`CoreError::Unavailable`].
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    config: &'a ConfigTree,
    params: &'a ParamStore,
    outputs: Option<&'a OutputCache>,
    dns: Option<&'a dyn DnsFacade>,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a ConfigTree, params: &'a ParamStore) -> Self {
        Self {
            config,
            params,
            outputs: None,
            dns: None,
        }
    }

    pub fn with_outputs(mut self, outputs: &'a OutputCache) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_dns(mut self, dns: &'a dyn DnsFacade) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Pass A: replace every `${...}` marker in raw text
    pub async fn expand_strings(&self, raw: &str) -> Result<String> {
        let mut expanded = String::with_capacity(raw.len());
        let mut last_end = 0;
        for caps in REFERENCE_PATTERN.captures_iter(raw) {
            let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            expanded.push_str(&raw[last_end..whole.start()]);
            expanded.push_str(&self.expand_reference(var.as_str()).await?);
            last_end = whole.end();
        }
        expanded.push_str(&raw[last_end..]);
        Ok(expanded)
    }

    async fn expand_reference(&self, var: &str) -> Result<String> {
        if let Some(param) = var.strip_prefix('@') {
            return self.expand_param(param);
        }

        if let Some(spec) = var.strip_prefix('=') {
            let outputs = self
                .outputs
                .ok_or(CoreError::Unavailable("stack output provider"))?;
            return outputs
                .output(spec)
                .await?
                .ok_or_else(|| CoreError::OutputNotFound(var.to_string()));
        }

        if let Some(record) = var.strip_prefix('%') {
            let (record, values) = self.private_lookup(record).await?;
            let [value] = values.as_slice() else {
                return Err(CoreError::DnsLookup {
                    record,
                    message: format!("expected a single value, got {}", values.len()),
                });
            };
            let value = value.strip_prefix(QUOTE).unwrap_or(value);
            let value = value.strip_suffix(QUOTE).unwrap_or(value);
            return Ok(value.to_string());
        }

        Ok(self.config.scalar(var)?.to_text())
    }

    fn expand_param(&self, spec: &str) -> Result<String> {
        let (name, default) = match spec.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (spec, None),
        };

        if let Some(value) = self.params.getparam(name) {
            return Ok(value.to_text());
        }
        match default {
            Some(default) => match default.strip_prefix('$') {
                Some(key) => Ok(self.config.scalar(key)?.to_text()),
                None => Ok(default.to_string()),
            },
            None => Err(CoreError::UndefinedParameter(name.to_string())),
        }
    }

    /// Pass B: resolve `$`-prefixed string leaves of a parsed tree in place
    pub fn resolve_vars<'b>(&'b self, value: &'b mut Value) -> BoxFuture<'b, Result<()>> {
        async move {
            match value {
                Value::Sequence(items) => {
                    for item in items.iter_mut() {
                        self.resolve_vars(item).await?;
                    }
                }
                Value::Mapping(map) => {
                    for item in map.values_mut() {
                        self.resolve_vars(item).await?;
                    }
                }
                Value::Scalar(Scalar::Str(s)) => {
                    if let Some(rest) = s.strip_prefix('$') {
                        let rest = rest.to_string();
                        if let Some(literal) = rest.strip_prefix('$') {
                            *value = Value::str(format!("${literal}"));
                        } else if !rest.is_empty() {
                            *value = self.resolve_reference(&rest).await?;
                        }
                    }
                }
                Value::Scalar(_) => {}
            }
            Ok(())
        }
        .boxed()
    }

    async fn resolve_reference(&self, var: &str) -> Result<Value> {
        if let Some(name) = var.strip_prefix('@') {
            return self
                .params
                .getparam(name)
                .cloned()
                .map(Value::Scalar)
                .ok_or_else(|| CoreError::UndefinedParameter(name.to_string()));
        }

        if let Some(record) = var.strip_prefix('%') {
            let (record, values) = self.private_lookup(record).await?;
            if values.is_empty() {
                return Err(CoreError::DnsLookup {
                    record,
                    message: "no values returned".to_string(),
                });
            }
            return Ok(Value::Sequence(values.into_iter().map(Value::str).collect()));
        }

        self.config
            .get(var)
            .cloned()
            .ok_or_else(|| CoreError::UndefinedVariable(var.to_string()))
    }

    /// Look up a record in the private zone, after applying `ConfigDom`
    async fn private_lookup(&self, record: &str) -> Result<(String, Vec<String>)> {
        let dns = self.dns.ok_or(CoreError::Unavailable("DNS provider"))?;

        let mut record = record.to_string();
        if let Some(config_dom) = self.config.str("ConfigDom")
            && !record.ends_with(&config_dom)
        {
            record.push_str(&config_dom);
        }
        let fqdn = match self.config.str("DNSDomain") {
            Some(domain) => qualify_name(&record, &domain),
            None => record.clone(),
        };

        tracing::debug!("Looking up private record {}", fqdn);
        let values = dns.lookup(&fqdn, DnsZone::Private).await?;
        Ok((record, values))
    }
}

/// Append `domain` unless `name` already ends with it
pub fn qualify_name(name: &str, domain: &str) -> String {
    let name = name.trim_end_matches('.');
    let domain = domain.trim_end_matches('.');
    if name.ends_with(domain) {
        name.to_string()
    } else {
        format!("{name}.{domain}")
    }
}

/// Rewrite every mapping key below `value` into snake_case
pub fn normalize_keys(value: &mut Value) {
    match value {
        Value::Mapping(map) => {
            let entries = std::mem::take(map);
            for (key, mut child) in entries {
                normalize_keys(&mut child);
                map.insert(snake_case(&key), child);
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(normalize_keys),
        Value::Scalar(_) => {}
    }
}

/// `BlockDeviceMappings` → `block_device_mappings`, `VPCId` → `vpc_id`,
/// `device-name` → `device_name`. Already snake_case keys are unchanged.
pub fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}
