use thiserror::Error;

use crate::types::NodeKind;

/// Classifies errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// URI scheme is not one of the supported protocols
    UnsupportedProtocol,
    /// Scheme recognized but a required field is missing or unparseable
    MalformedUri,
    /// Rule selection names an unknown preset
    RuleResolution,
    /// A node kind the target format cannot express
    UnsupportedNodeForTarget,
    /// Build-time validation failed (no proxies, bad base document, ...)
    ConfigValidation,
    /// Serializer or deserializer failure
    Serialization,
    /// Subscription fetcher failure
    Fetch,
    /// Key-value store collaborator failure
    Store,
}

/// Sublink error types
#[derive(Error, Debug)]
pub enum SublinkError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Malformed {scheme} URI: {message}")]
    MalformedUri {
        scheme: &'static str,
        message: String,
    },

    #[error("Unknown rule preset: {0}")]
    RuleResolution(String),

    #[error("{target} cannot express {kind} nodes")]
    UnsupportedNodeForTarget {
        target: &'static str,
        kind: NodeKind,
    },

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Store error: {0}")]
    Store(String),
}

impl SublinkError {
    pub(crate) fn malformed(scheme: &'static str, message: impl Into<String>) -> Self {
        SublinkError::MalformedUri {
            scheme,
            message: message.into(),
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SublinkError::UnsupportedProtocol(_) => ErrorKind::UnsupportedProtocol,
            SublinkError::MalformedUri { .. } => ErrorKind::MalformedUri,
            SublinkError::RuleResolution(_) => ErrorKind::RuleResolution,
            SublinkError::UnsupportedNodeForTarget { .. } => ErrorKind::UnsupportedNodeForTarget,
            SublinkError::ConfigValidation(_) => ErrorKind::ConfigValidation,
            SublinkError::Json(_) | SublinkError::Yaml(_) => ErrorKind::Serialization,
            SublinkError::Fetch { .. } => ErrorKind::Fetch,
            SublinkError::Store(_) => ErrorKind::Store,
        }
    }
}

pub type Result<T> = std::result::Result<T, SublinkError>;
