//! Errors surfaced by the control façade.

use engine::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a control operation.
///
/// Per-entry selector patch problems and probe failures are not errors; they
/// are reported through `PatchReport` and `ProbeOutcome`.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("configuration rejected: {0}")]
    ConfigParse(#[source] ConfigError),

    #[error("profile {path} unreadable: {source}")]
    ProfileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed selector patch: {0}")]
    MalformedPatch(#[from] serde_json::Error),

    #[error("invalid tunnel mode: {0}")]
    InvalidMode(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("engine is not initialized")]
    Uninitialized,
}

impl From<ConfigError> for ControlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { path, source } => ControlError::ProfileIo { path, source },
            other => ControlError::ConfigParse(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
