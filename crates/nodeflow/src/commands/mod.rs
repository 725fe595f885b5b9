pub mod expand;
pub mod templates;
pub mod validate;

use anyhow::Context;
use nodeflow_core::{ConfigTree, DirTemplateSource};
use std::path::PathBuf;

/// Locate and load the configuration
pub fn load_config() -> anyhow::Result<(PathBuf, ConfigTree)> {
    let path = nodeflow_config::find_config_file()?;
    let config = ConfigTree::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok((path, config))
}

/// Templates next to the configuration, then the user's own
pub fn template_source(config_file: &std::path::Path) -> DirTemplateSource {
    DirTemplateSource::new(nodeflow_config::template_dirs(config_file))
}

/// `key=value` command-line parameter
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}
