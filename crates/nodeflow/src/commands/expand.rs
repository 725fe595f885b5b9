//! Offline template expansion
//!
//! Runs the same resolution passes a launch would, against the local
//! configuration only. Stack-output (`=`) and DNS (`%`) references fail
//! since no provider is configured.

use nodeflow_core::{
    ConfigTree, Mapping, NODE_CLASS, ParamStore, Resolver, Scalar, Template, TemplateCache, Value,
    normalize_keys,
};
use std::sync::Arc;

pub async fn handle(class: &str, name: &str, params: Vec<(String, String)>) -> anyhow::Result<()> {
    let (path, config) = super::load_config()?;
    let templates = TemplateCache::new(Arc::new(super::template_source(&path)));
    let params = param_store(&config, params);

    let expanded = expand(&config, &params, &templates, class, name).await?;
    print!("{}", serde_yaml::to_string(&expanded)?);
    Ok(())
}

fn param_store(config: &ConfigTree, params: Vec<(String, String)>) -> ParamStore {
    let mut store = ParamStore::new();
    for (key, value) in params {
        store.setparam(key, param_value(&value));
    }
    if let Some(domain) = config.str("DNSDomain") {
        store.normalize_names(&domain);
    }
    store
}

/// Command-line values are typed the way YAML would type them
fn param_value(text: &str) -> Scalar {
    match Value::from_yaml_str(text) {
        Ok(Value::Scalar(scalar)) if !scalar.is_null() => scalar,
        _ => Scalar::Str(text.to_string()),
    }
}

async fn expand(
    config: &ConfigTree,
    params: &ParamStore,
    templates: &TemplateCache,
    class: &str,
    name: &str,
) -> nodeflow_core::Result<Value> {
    let resolver = Resolver::new(config, params);
    let mut value = templates.load(&resolver, class, name).await?;
    if class != NODE_CLASS {
        resolver.resolve_vars(&mut value).await?;
        normalize_keys(&mut value);
        return Ok(value);
    }

    let mut template = Template::from_value(name, value)?;
    resolver.resolve_vars(&mut template.request).await?;
    normalize_keys(&mut template.request);
    if let Some(tags) = template.tags.as_mut() {
        resolver.resolve_vars(tags).await?;
    }
    for iface in template.additional_interfaces.iter_mut() {
        resolver.resolve_vars(iface).await?;
        normalize_keys(iface);
    }

    let mut doc = Mapping::new();
    doc.insert("api_template".to_string(), template.request);
    if let Some(tags) = template.tags {
        doc.insert("tags".to_string(), tags);
    }
    if let Some(metadata) = template.metadata {
        doc.insert("metadata".to_string(), metadata);
    }
    if template.private_sg {
        doc.insert("private_sg".to_string(), Value::Scalar(Scalar::Bool(true)));
    }
    if !template.additional_interfaces.is_empty() {
        doc.insert(
            "additional_interfaces".to_string(),
            Value::Sequence(template.additional_interfaces),
        );
    }
    Ok(Value::Mapping(doc))
}
