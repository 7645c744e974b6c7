//! The routing engine state the control layer steers.

use crate::adapter::{DirectAdapter, ProxyAdapter, RejectAdapter, RemoteAdapter, Selector, StaticGroup};
use crate::config::{Configuration, General, GroupKind, DIRECT, GLOBAL, REJECT};
use crate::error::ConfigError;
use crate::log::LogBus;
use crate::statistic::StatisticsManager;
use crate::types::{AdapterType, TunnelMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

type Registry = HashMap<String, Arc<dyn ProxyAdapter>>;

/// Routing engine
pub struct Engine {
    proxies: RwLock<Registry>,
    rules: RwLock<Vec<String>>,
    mode: RwLock<TunnelMode>,
    listeners: RwLock<Option<General>>,
    dns_enabled: AtomicBool,
    statistics: Arc<StatisticsManager>,
    log_bus: Arc<LogBus>,
}

impl Engine {
    /// Create an empty engine holding only the built-in adapters
    pub fn new() -> Self {
        let mut proxies: Registry = HashMap::new();
        Self::insert_builtins(&mut proxies);

        Self {
            proxies: RwLock::new(proxies),
            rules: RwLock::new(Vec::new()),
            mode: RwLock::new(TunnelMode::default()),
            listeners: RwLock::new(None),
            dns_enabled: AtomicBool::new(false),
            statistics: StatisticsManager::new(),
            log_bus: Arc::new(LogBus::default()),
        }
    }

    pub fn statistics(&self) -> &Arc<StatisticsManager> {
        &self.statistics
    }

    pub fn log_bus(&self) -> &Arc<LogBus> {
        &self.log_bus
    }

    /// Apply a configuration.
    ///
    /// Proxies, groups, rules, mode and log level are always replaced. The
    /// listening parameters are only taken over when `is_base` is set.
    pub async fn apply(&self, config: &Configuration, is_base: bool) -> Result<(), ConfigError> {
        let registry = {
            let previous = self.proxies.read().await;
            Self::build_registry(config, &previous)?
        };
        let proxy_count = registry.len();

        *self.proxies.write().await = registry;
        *self.rules.write().await = config.rules.clone();
        self.dns_enabled.store(config.dns.enable, Ordering::Relaxed);

        if is_base {
            let general = &config.general;
            info!(
                port = general.port,
                socks_port = general.socks_port,
                mixed_port = general.mixed_port,
                allow_lan = general.allow_lan,
                "Listeners updated"
            );
            *self.listeners.write().await = Some(general.clone());
        }

        self.log_bus.set_level(config.general.log_level);
        self.set_mode(config.general.mode).await;

        info!(
            proxies = proxy_count,
            rules = config.rules.len(),
            dns = config.dns.enable,
            is_base,
            "Configuration applied"
        );
        self.log_bus.info(format!(
            "Configuration applied: {} proxies, {} rules",
            proxy_count,
            config.rules.len()
        ));
        Ok(())
    }

    /// Current global routing mode
    pub async fn mode(&self) -> TunnelMode {
        *self.mode.read().await
    }

    /// Commit a new routing mode.
    pub async fn set_mode(&self, mode: TunnelMode) {
        let mut current = self.mode.write().await;
        if *current != mode {
            info!(old = %*current, new = %mode, "Tunnel mode changed");
            self.log_bus
                .info(format!("Switch tunnel mode: {} --> {}", *current, mode));
        }
        *current = mode;
    }

    /// Look up a proxy or group by name
    pub async fn proxy(&self, name: &str) -> Option<Arc<dyn ProxyAdapter>> {
        self.proxies.read().await.get(name).cloned()
    }

    /// Snapshot of the registry
    pub async fn proxies(&self) -> HashMap<String, Arc<dyn ProxyAdapter>> {
        self.proxies.read().await.clone()
    }

    /// Add or replace a single registry entry outside of a configuration apply.
    pub async fn register(&self, adapter: Arc<dyn ProxyAdapter>) {
        debug!(name = adapter.name(), kind = %adapter.adapter_type(), "Registering proxy");
        self.proxies
            .write()
            .await
            .insert(adapter.name().to_string(), adapter);
    }

    pub async fn rules(&self) -> Vec<String> {
        self.rules.read().await.clone()
    }

    /// Listening parameters of the last base configuration
    pub async fn listeners(&self) -> Option<General> {
        self.listeners.read().await.clone()
    }

    pub fn dns_enabled(&self) -> bool {
        self.dns_enabled.load(Ordering::Relaxed)
    }

    fn insert_builtins(proxies: &mut Registry) {
        proxies.insert(DIRECT.to_string(), Arc::new(DirectAdapter::new(DIRECT)));
        proxies.insert(REJECT.to_string(), Arc::new(RejectAdapter::new(REJECT)));
    }

    /// Build a fresh registry, carrying selections over when the profile
    /// asks for it.
    fn build_registry(config: &Configuration, previous: &Registry) -> Result<Registry, ConfigError> {
        let mut proxies: Registry = HashMap::new();
        Self::insert_builtins(&mut proxies);

        for spec in &config.proxies {
            let adapter = RemoteAdapter::new(&spec.name, &spec.protocol, &spec.server, spec.port);
            proxies.insert(spec.name.clone(), Arc::new(adapter));
        }

        let restore = |selector: &Selector| {
            if !config.profile.store_selected {
                return;
            }
            let stored = previous
                .get(selector.name())
                .and_then(|p| p.as_selector().map(|s| s.selected().to_string()));
            if let Some(stored) = stored
                && selector.set(&stored).is_ok()
            {
                debug!(group = selector.name(), selected = %stored, "Restored selection");
            }
        };

        for group in config.group_order()? {
            let members = group
                .proxies
                .iter()
                .map(|member| {
                    proxies.get(member).cloned().ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "proxy group {} references unknown proxy {}",
                            group.name, member
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let adapter: Arc<dyn ProxyAdapter> = match group.kind {
                GroupKind::Select => {
                    let selector = Selector::new(&group.name, members);
                    restore(&selector);
                    Arc::new(selector)
                }
                GroupKind::UrlTest => Arc::new(StaticGroup::new(&group.name, AdapterType::UrlTest, members)),
                GroupKind::Fallback => Arc::new(StaticGroup::new(&group.name, AdapterType::Fallback, members)),
                GroupKind::LoadBalance => {
                    Arc::new(StaticGroup::new(&group.name, AdapterType::LoadBalance, members))
                }
                GroupKind::Relay => Arc::new(StaticGroup::new(&group.name, AdapterType::Relay, members)),
            };
            proxies.insert(group.name.clone(), adapter);
        }

        if !proxies.contains_key(GLOBAL) {
            let names = [DIRECT, REJECT]
                .into_iter()
                .chain(config.proxies.iter().map(|p| p.name.as_str()))
                .chain(config.proxy_groups.iter().map(|g| g.name.as_str()));
            let members: Vec<_> = names.filter_map(|n| proxies.get(n).cloned()).collect();
            let global = Selector::new(GLOBAL, members);
            restore(&global);
            proxies.insert(GLOBAL.to_string(), Arc::new(global));
        }

        Ok(proxies)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    const CONFIG: &str = r#"
mixed-port: 7890
mode: rule
log-level: debug
profile:
  store-selected: true
proxies:
  - { name: hk, type: ss, server: hk.example.com, port: 8388 }
  - { name: jp, type: vmess, server: jp.example.com, port: 443 }
proxy-groups:
  - { name: select, type: select, proxies: [hk, jp, auto] }
  - { name: auto, type: url-test, proxies: [hk, jp] }
rules:
  - MATCH,select
"#;

    fn parse(yaml: &str) -> Configuration {
        Configuration::from_bytes(yaml.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_new_engine_has_builtins() {
        let engine = Engine::new();
        assert!(engine.proxy(DIRECT).await.is_some());
        assert!(engine.proxy(REJECT).await.is_some());
        assert_eq!(engine.mode().await, TunnelMode::Rule);
    }

    #[tokio::test]
    async fn test_apply_builds_registry() {
        let engine = Engine::new();
        engine.apply(&parse(CONFIG), true).await.unwrap();

        let proxies = engine.proxies().await;
        assert!(proxies.contains_key("hk"));
        assert!(proxies.contains_key("jp"));
        assert_eq!(proxies["select"].adapter_type(), AdapterType::Selector);
        assert_eq!(proxies["auto"].adapter_type(), AdapterType::UrlTest);
        assert_eq!(proxies[GLOBAL].adapter_type(), AdapterType::Selector);
        assert_eq!(engine.rules().await, vec!["MATCH,select".to_string()]);
        assert_eq!(engine.log_bus().level(), LogLevel::Debug);
        assert_eq!(engine.listeners().await.unwrap().mixed_port, 7890);
    }

    #[tokio::test]
    async fn test_non_base_apply_keeps_listeners() {
        let engine = Engine::new();
        engine.apply(&parse(CONFIG), true).await.unwrap();

        let mut profile = parse(CONFIG);
        profile.general.mixed_port = 9999;
        engine.apply(&profile, false).await.unwrap();

        assert_eq!(engine.listeners().await.unwrap().mixed_port, 7890);
    }

    #[tokio::test]
    async fn test_store_selected_restores_selection() {
        let engine = Engine::new();
        engine.apply(&parse(CONFIG), true).await.unwrap();
        let select = engine.proxy("select").await.unwrap();
        select.as_selector().unwrap().set("jp").unwrap();

        engine.apply(&parse(CONFIG), true).await.unwrap();

        let select = engine.proxy("select").await.unwrap();
        assert_eq!(select.as_selector().unwrap().selected(), "jp");
    }

    #[tokio::test]
    async fn test_without_store_selected_resets_selection() {
        let engine = Engine::new();
        engine.apply(&parse(CONFIG), true).await.unwrap();
        let select = engine.proxy("select").await.unwrap();
        select.as_selector().unwrap().set("jp").unwrap();

        let mut config = parse(CONFIG);
        config.profile.store_selected = false;
        engine.apply(&config, true).await.unwrap();

        let select = engine.proxy("select").await.unwrap();
        assert_eq!(select.as_selector().unwrap().selected(), "hk");
    }

    #[tokio::test]
    async fn test_apply_replaces_previous_proxies() {
        let engine = Engine::new();
        engine.apply(&parse(CONFIG), true).await.unwrap();
        engine.apply(&parse("mode: global\n"), true).await.unwrap();

        assert!(engine.proxy("hk").await.is_none());
        assert_eq!(engine.mode().await, TunnelMode::Global);
    }

    #[tokio::test]
    async fn test_set_mode_publishes_log_event() {
        let engine = Engine::new();
        let mut sub = engine.log_bus().subscribe(8);

        engine.set_mode(TunnelMode::Global).await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.payload, "Switch tunnel mode: rule --> global");
    }

    #[tokio::test]
    async fn test_register_adds_entry() {
        let engine = Engine::new();
        engine.register(Arc::new(RejectAdapter::new("blackhole"))).await;
        assert!(engine.proxy("blackhole").await.is_some());
    }
}
