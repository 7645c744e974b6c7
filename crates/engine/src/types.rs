//! Engine-wide enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Global routing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Every connection bypasses the proxies
    Direct,
    /// Connections are matched against the rule set
    #[default]
    Rule,
    /// Every connection goes through the GLOBAL selector
    Global,
}

impl TunnelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelMode::Direct => "direct",
            TunnelMode::Rule => "rule",
            TunnelMode::Global => "global",
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized mode or level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized name: {0}")]
pub struct UnknownName(pub String);

impl FromStr for TunnelMode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(TunnelMode::Direct),
            "rule" => Ok(TunnelMode::Rule),
            "global" => Ok(TunnelMode::Global),
            _ => Err(UnknownName(s.to_string())),
        }
    }
}

/// Log severity, ordered from most to least verbose.
///
/// `Silent` is only meaningful as a minimum level: nothing is emitted at it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            _ => Err(UnknownName(s.to_string())),
        }
    }
}

/// Kind of a registered proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterType {
    Direct,
    Reject,
    /// A protocol adapter (ss, vmess, trojan, ...)
    Remote(String),
    Selector,
    UrlTest,
    Fallback,
    LoadBalance,
    Relay,
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterType::Direct => write!(f, "Direct"),
            AdapterType::Reject => write!(f, "Reject"),
            AdapterType::Remote(protocol) => write!(f, "{}", protocol),
            AdapterType::Selector => write!(f, "Selector"),
            AdapterType::UrlTest => write!(f, "URLTest"),
            AdapterType::Fallback => write!(f, "Fallback"),
            AdapterType::LoadBalance => write!(f, "LoadBalance"),
            AdapterType::Relay => write!(f, "Relay"),
        }
    }
}
