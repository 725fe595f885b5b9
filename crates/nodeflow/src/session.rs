//! Session state
//!
//! A session owns the loaded configuration, the provider clients and the
//! caches that live as long as it does (stack outputs, raw templates).
//! Callers that need fresh stack outputs start a new session.

use nodeflow_cloud::{
    CloudError, ComputeProvider, DnsFacade, LockService, OutputProvider, Result, StorageProvider,
};
use nodeflow_core::{
    ConfigTree, DNS_CLASS, NODE_CLASS, OutputCache, ParamStore, Resolver, Template, TemplateCache,
    TemplateSource, Value, normalize_keys,
};
use std::sync::Arc;

/// Provider clients a session talks to
#[derive(Clone)]
pub struct Providers {
    pub compute: Arc<dyn ComputeProvider>,
    pub storage: Arc<dyn StorageProvider>,
    pub dns: Arc<dyn DnsFacade>,
    pub outputs: Arc<dyn OutputProvider>,
    pub lock: Arc<dyn LockService>,
    pub templates: Arc<dyn TemplateSource>,
}

pub struct Session {
    config: ConfigTree,
    providers: Providers,
    outputs: OutputCache,
    templates: TemplateCache,
}

impl Session {
    pub fn new(config: ConfigTree, providers: Providers) -> Self {
        let outputs = OutputCache::new(providers.outputs.clone(), config.str("StackPrefix"));
        let templates = TemplateCache::new(providers.templates.clone());
        Self {
            config,
            providers,
            outputs,
            templates,
        }
    }

    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    pub fn compute(&self) -> &dyn ComputeProvider {
        self.providers.compute.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageProvider {
        self.providers.storage.as_ref()
    }

    pub fn dns(&self) -> &dyn DnsFacade {
        self.providers.dns.as_ref()
    }

    pub fn lock_service(&self) -> Arc<dyn LockService> {
        self.providers.lock.clone()
    }

    /// `DNSDomain`, required by every node operation
    pub fn domain(&self) -> Result<String> {
        self.config
            .str("DNSDomain")
            .ok_or_else(|| CloudError::InvalidParameters("DNSDomain is not configured".to_string()))
    }

    pub fn public_zone_id(&self) -> Option<String> {
        self.config.str("PublicDNSId")
    }

    pub fn private_zone_id(&self) -> Option<String> {
        self.config.str("PrivateDNSId")
    }

    /// A resolver wired to this session's providers and caches
    pub fn resolver<'a>(&'a self, params: &'a ParamStore) -> Resolver<'a> {
        Resolver::new(&self.config, params)
            .with_outputs(&self.outputs)
            .with_dns(self.providers.dns.as_ref())
    }

    pub async fn list_templates(&self, class: &str) -> Result<Vec<String>> {
        Ok(self.templates.list(class).await?)
    }

    /// Load a node template (string expansion, parsing, key normalization)
    pub async fn load_template(&self, params: &ParamStore, name: &str) -> Result<Template> {
        let resolver = self.resolver(params);
        let value = self.templates.load(&resolver, NODE_CLASS, name).await?;
        Ok(Template::from_value(name, value)?)
    }

    /// Load a DNS change template fully resolved, ready for the DNS provider
    pub async fn load_change(&self, params: &ParamStore, name: &str) -> Result<serde_json::Value> {
        let resolver = self.resolver(params);
        let mut change: Value = self.templates.load(&resolver, DNS_CLASS, name).await?;
        resolver.resolve_vars(&mut change).await?;
        normalize_keys(&mut change);
        Ok(change.to_json())
    }
}
