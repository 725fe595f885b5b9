use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found. Looked in:\n\
        - NODEFLOW_CONFIG environment variable\n\
        - current directory: cloudconfig.local.yaml, .cloudconfig.local.yaml, cloudconfig.yaml, .cloudconfig.yaml\n\
        - ./.nodeflow/ directory\n\
        - ~/.config/nodeflow/cloudconfig.yaml"
    )]
    ConfigFileNotFound,

    #[error("NODEFLOW_CONFIG points to a missing file: {0}")]
    EnvPathMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
