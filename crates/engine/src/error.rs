//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while parsing or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Errors returned by `Selector::set`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("group {group} has no member named {member}")]
    UnknownMember { group: String, member: String },
}

/// Errors returned by a URL test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("proxy {0} rejects all traffic")]
    Rejected(String),

    #[error("probe deadline exceeded")]
    DeadlineExceeded,

    #[error("probe cancelled")]
    Cancelled,
}
