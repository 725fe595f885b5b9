//! Cloud provider error types

use thiserror::Error;

/// Errors surfaced by providers and by the node-lifecycle orchestrator
#[derive(Error, Debug)]
pub enum CloudError {
    /// Zero matches for a lookup that must identify exactly one resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ambiguous match, pre-existing resource, or a concurrent race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Mutually exclusive or malformed caller input
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Template error: {0}")]
    Template(String),

    /// The backing service rejected or failed a call
    #[error("Provider error: {0}")]
    Provider(String),

    /// A record or resource shape that cannot be reconciled
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Volume attach failed: {0}")]
    Attach(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
