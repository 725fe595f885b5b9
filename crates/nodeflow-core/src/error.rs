use nodeflow_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing required top-level configuration item in {source_name}: {key}")]
    MissingConfig { source_name: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Reference to undefined parameter: \"{0}\"")]
    UndefinedParameter(String),

    #[error("Bad variable reference: \"{0}\" not defined in configuration")]
    UndefinedVariable(String),

    #[error("Bad variable reference: \"{var}\" expands to non-scalar {kind}")]
    NonScalar { var: String, kind: &'static str },

    #[error("Output not found while expanding \"{0}\"")]
    OutputNotFound(String),

    #[error("DNS lookup of \"{record}\": {message}")]
    DnsLookup { record: String, message: String },

    #[error("No {0} available for resolving references")]
    Unavailable(&'static str),

    #[error("Template not found: {class}/{name}")]
    TemplateNotFound { class: String, name: String },

    #[error("Invalid template {name}: {message}")]
    InvalidTemplate { name: String, message: String },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {path}: {message}")]
    IoError { path: PathBuf, message: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<CoreError> for CloudError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cloud(e) => e,
            other => CloudError::Template(other.to_string()),
        }
    }
}
