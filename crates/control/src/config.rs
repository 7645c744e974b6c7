//! Façade settings loaded from `control.yaml` in the home directory.
//!
//! The file is optional and only tunes the relays and local logging. The
//! engine configuration itself is handed over by the host at setup.

use crate::types::RelaySettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// File name looked up in the home directory
pub const SETTINGS_FILE: &str = "control.yaml";

/// Settings error types
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Top-level settings document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub relay: RelayTuning,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.relay.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Relay buffer and cadence settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RelayTuning {
    #[validate(range(min = 16, max = 65536))]
    pub log_buffer: usize,

    #[validate(range(min = 1, max = 65536))]
    pub log_subscription: usize,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_traffic_interval")]
    pub traffic_interval: Duration,
}

/// Local tracing output
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    pub level: Option<String>,

    /// "text" or "json"
    #[validate(custom = "validate_log_format")]
    pub format: Option<String>,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

impl Default for RelayTuning {
    fn default() -> Self {
        let defaults = RelaySettings::default();
        Self {
            log_buffer: defaults.log_buffer,
            log_subscription: defaults.log_subscription,
            traffic_interval: defaults.traffic_interval,
        }
    }
}

fn validate_traffic_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("traffic_interval_out_of_range"));
    }
    Ok(())
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format {
        "text" | "json" => Ok(()),
        _ => Err(ValidationError::new("log_format_unknown")),
    }
}

impl Settings {
    /// Load `control.yaml` from `home_dir`, or defaults when it is absent.
    pub fn load(home_dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = home_dir.as_ref().join(SETTINGS_FILE);
        if path.is_file() {
            tracing::info!("Loading settings from: {}", path.display());
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No settings file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Like `load`, but an unusable file falls back to defaults with a warning.
    pub fn load_or_default(home_dir: impl AsRef<Path>) -> Self {
        Self::load(home_dir).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring settings file");
            Self::default()
        })
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_relay_settings(&self) -> RelaySettings {
        RelaySettings {
            log_buffer: self.relay.log_buffer,
            log_subscription: self.relay.log_subscription,
            traffic_interval: self.relay.traffic_interval,
        }
    }
}
