pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file directly
pub const CONFIG_ENV: &str = "NODEFLOW_CONFIG";

const APP_DIR: &str = "nodeflow";
const PROJECT_DIR: &str = ".nodeflow";
const TEMPLATES_DIR: &str = "templates";
const GLOBAL_CONFIG: &str = "cloudconfig.yaml";
const CANDIDATES: [&str; 4] = [
    "cloudconfig.local.yaml",
    ".cloudconfig.local.yaml",
    "cloudconfig.yaml",
    ".cloudconfig.yaml",
];

/// Find the configuration file
///
/// Search order:
/// 1. `NODEFLOW_CONFIG` (direct path)
/// 2. current directory: cloudconfig.local.yaml, .cloudconfig.local.yaml, cloudconfig.yaml, .cloudconfig.yaml
/// 3. the same names under `./.nodeflow/`
/// 4. `~/.config/nodeflow/cloudconfig.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(&config_path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::EnvPathMissing(config_path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = first_candidate(&current_dir) {
        return Ok(path);
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_candidate(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join(APP_DIR).join(GLOBAL_CONFIG);
        if global_config.is_file() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn first_candidate(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Template directories for a configuration file, in search order
///
/// `<config dir>/templates` first, then `~/.config/nodeflow/templates`.
/// Directories that do not exist are left out.
pub fn template_dirs(config_file: &Path) -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();

    if let Some(parent) = config_file.parent() {
        let local = if parent.as_os_str().is_empty() {
            PathBuf::from(TEMPLATES_DIR)
        } else {
            parent.join(TEMPLATES_DIR)
        };
        if local.is_dir() {
            dirs_found.push(local);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join(APP_DIR).join(TEMPLATES_DIR);
        if global.is_dir() && !dirs_found.contains(&global) {
            dirs_found.push(global);
        }
    }

    dirs_found
}
