//! Engine configuration model and parser.
//!
//! The document is the usual YAML profile layout: general listening settings
//! at the top level, then `dns`, `profile`, `proxies`, `proxy-groups` and
//! `rules`. Rules are carried opaquely; their evaluation happens elsewhere.

use crate::error::ConfigError;
use crate::types::{LogLevel, TunnelMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Name of the built-in adapter that connects directly
pub const DIRECT: &str = "DIRECT";

/// Name of the built-in adapter that refuses every connection
pub const REJECT: &str = "REJECT";

/// Name of the selector the engine synthesizes for global mode
pub const GLOBAL: &str = "GLOBAL";

/// Listening parameters and process-wide switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct General {
    pub port: u16,
    pub socks_port: u16,
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: TunnelMode,
    pub log_level: LogLevel,
    pub ipv6: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_controller: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            port: 0,
            socks_port: 0,
            mixed_port: 0,
            allow_lan: false,
            bind_address: "*".to_string(),
            mode: TunnelMode::Rule,
            log_level: LogLevel::Info,
            ipv6: false,
            external_controller: None,
        }
    }
}

/// Resolver settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsSettings {
    pub enable: bool,
    pub listen: Option<String>,
    pub nameserver: Vec<String>,
}

/// Profile persistence settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProfileSettings {
    /// Keep selector choices across reloads
    pub store_selected: bool,
}

/// A single outbound proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySpec {
    pub name: String,

    /// Protocol name (ss, vmess, trojan, socks5, http, ...)
    #[serde(rename = "type")]
    pub protocol: String,

    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub port: u16,

    /// Protocol-specific keys, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Proxy group strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Select,
    UrlTest,
    Fallback,
    LoadBalance,
    Relay,
}

/// A proxy group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: GroupKind,

    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(flatten)]
    pub general: General,

    #[serde(default)]
    pub dns: DnsSettings,

    #[serde(default)]
    pub profile: ProfileSettings,

    #[serde(default)]
    pub proxies: Vec<ProxySpec>,

    #[serde(default)]
    pub proxy_groups: Vec<GroupSpec>,

    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

impl Configuration {
    /// Parse and validate a configuration from raw YAML bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    /// Check name uniqueness and that every group member resolves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names: HashSet<&str> = HashSet::from([DIRECT, REJECT]);

        for proxy in &self.proxies {
            if proxy.name.trim().is_empty() {
                return Err(ConfigError::invalid("proxy with empty name"));
            }
            if !names.insert(proxy.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate proxy name {}",
                    proxy.name
                )));
            }
        }

        for group in &self.proxy_groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::invalid("proxy group with empty name"));
            }
            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate proxy group name {}",
                    group.name
                )));
            }
            if group.proxies.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "proxy group {} has no members",
                    group.name
                )));
            }
        }

        for group in &self.proxy_groups {
            if let Some(missing) = group.proxies.iter().find(|m| !names.contains(m.as_str())) {
                return Err(ConfigError::invalid(format!(
                    "proxy group {} references unknown proxy {}",
                    group.name, missing
                )));
            }
        }

        self.group_order().map(|_| ())
    }

    /// Groups ordered so that every group comes after the groups it contains.
    pub fn group_order(&self) -> Result<Vec<&GroupSpec>, ConfigError> {
        let index: HashMap<&str, usize> = self
            .proxy_groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.as_str(), i))
            .collect();

        let mut state = vec![Visit::New; self.proxy_groups.len()];
        let mut order = Vec::with_capacity(self.proxy_groups.len());

        for i in 0..self.proxy_groups.len() {
            self.visit(i, &index, &mut state, &mut order)?;
        }

        Ok(order.into_iter().map(|i| &self.proxy_groups[i]).collect())
    }

    fn visit(
        &self,
        i: usize,
        index: &HashMap<&str, usize>,
        state: &mut [Visit],
        order: &mut Vec<usize>,
    ) -> Result<(), ConfigError> {
        match state[i] {
            Visit::Done => return Ok(()),
            Visit::Active => {
                return Err(ConfigError::invalid(format!(
                    "proxy group {} is part of a cycle",
                    self.proxy_groups[i].name
                )));
            }
            Visit::New => {}
        }

        state[i] = Visit::Active;
        for member in &self.proxy_groups[i].proxies {
            if let Some(&j) = index.get(member.as_str()) {
                self.visit(j, index, state, order)?;
            }
        }
        state[i] = Visit::Done;
        order.push(i);
        Ok(())
    }
}
