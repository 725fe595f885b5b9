//! Per-invocation parameter store

use crate::value::Scalar;
use std::collections::HashMap;

/// Request-scoped parameter table (node name, volume name, snapshot id, ...)
///
/// Not shared between concurrent operations: each orchestration owns one.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    params: HashMap<String, Scalar>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table
    pub fn setparams(&mut self, params: HashMap<String, Scalar>) {
        self.params = params;
    }

    pub fn setparam(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn getparam(&self, name: &str) -> Option<&Scalar> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    /// Several parameters at once, in the order asked for
    pub fn getparams<const N: usize>(&self, names: [&str; N]) -> [Option<&Scalar>; N] {
        names.map(|n| self.getparam(n))
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.getparam(name).map(Scalar::to_text)
    }

    pub fn remove(&mut self, name: &str) -> Option<Scalar> {
        self.params.remove(name)
    }

    /// Canonicalize `name` / `volname` for `domain` and derive `fqdn`
    pub fn normalize_names(&mut self, domain: &str) {
        for key in ["name", "volname"] {
            if let Some(raw) = self.get_str(key) {
                self.setparam(key, normalize_name(&raw, domain));
            }
        }
        if let Some(name) = self.get_str("name") {
            self.setparam("fqdn", format!("{name}.{domain}"));
        }
    }
}

/// Lowercase, drop a trailing dot and a trailing `.<domain>`
pub fn normalize_name(name: &str, domain: &str) -> String {
    let name = name.trim().trim_end_matches('.').to_lowercase();
    let suffix = format!(".{}", domain.trim_end_matches('.').to_lowercase());
    match name.strip_suffix(&suffix) {
        Some(short) if !short.is_empty() => short.to_string(),
        _ => name,
    }
}
