//! The control façade.

use crate::config::Settings;
use crate::error::{ControlError, Result};
use crate::lifecycle::{EngineHandle, RelaySupervisor};
use crate::log_relay::LogRelay;
use crate::metrics::ControlMetrics;
use crate::mode;
use crate::probe;
use crate::selector;
use crate::sink::{HostSink, SinkSlot};
use crate::traffic_relay::TrafficRelay;
use crate::types::{PatchReport, ProbeOutcome, RelaySettings};
use engine::{Configuration, Engine, LogLevel};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Control surface over one embedded engine.
///
/// Configuration-changing calls take the handle's write lock and run one at
/// a time; reads share it.
pub struct Control {
    engine: Arc<Engine>,
    handle: RwLock<Option<EngineHandle>>,
    sink: SinkSlot,
    metrics: Arc<ControlMetrics>,
    relays: Mutex<RelaySupervisor>,
}

impl Control {
    pub fn new() -> Self {
        Self::with_engine(Arc::new(Engine::new()))
    }

    pub fn with_engine(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            handle: RwLock::new(None),
            sink: SinkSlot::new(),
            metrics: Arc::new(ControlMetrics::new()),
            relays: Mutex::new(RelaySupervisor::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<ControlMetrics> {
        &self.metrics
    }

    pub async fn is_initialized(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Parse and apply the base configuration, then start both relays.
    ///
    /// Relay tuning comes from `control.yaml` in `home_dir` when present.
    /// Meant to be called once; a second call starts another relay pair.
    pub async fn setup(
        &self,
        home_dir: impl Into<PathBuf>,
        config: &[u8],
        sink: Option<Arc<dyn HostSink>>,
    ) -> Result<()> {
        let home_dir = home_dir.into();
        let settings = Settings::load_or_default(&home_dir);
        self.setup_with(home_dir, config, sink, settings.to_relay_settings())
            .await
    }

    /// `setup` with explicit relay tuning.
    pub async fn setup_with(
        &self,
        home_dir: PathBuf,
        config: &[u8],
        sink: Option<Arc<dyn HostSink>>,
        relay: RelaySettings,
    ) -> Result<()> {
        let base = Configuration::from_bytes(config).map_err(|e| {
            error!(error = %e, "Rejected base configuration");
            ControlError::ConfigParse(e)
        })?;

        {
            let mut handle = self.handle.write().await;
            self.engine
                .apply(&base, true)
                .await
                .map_err(ControlError::ConfigParse)?;
            self.metrics.record_apply(true);
            *handle = Some(EngineHandle::new(home_dir.clone(), base));
        }

        if let Some(sink) = sink {
            self.sink.set(Some(sink)).await;
        }

        let log_relay = LogRelay::new(
            self.engine.log_bus().clone(),
            self.sink.clone(),
            self.metrics.clone(),
            relay.log_buffer,
            relay.log_subscription,
        );
        let traffic_relay = TrafficRelay::new(
            self.engine.statistics().clone(),
            self.sink.clone(),
            self.metrics.clone(),
            relay.traffic_interval,
        );
        self.relays.lock().await.start(log_relay, traffic_relay);

        info!(home = %home_dir.display(), "Engine initialized");
        Ok(())
    }

    /// Load `<home>/<uuid>/config.yaml` and apply it on top of the base.
    ///
    /// The profile keeps the base listeners, runs without DNS and without
    /// stored selections, and every open connection is closed first.
    pub async fn apply_profile(&self, uuid: &str) -> Result<()> {
        let mut guard = self.handle.write().await;
        let handle = guard.as_mut().ok_or(ControlError::Uninitialized)?;

        let (path, profile) = handle.load_profile(uuid).inspect_err(|e| {
            warn!(profile = uuid, error = %e, "Failed to load profile");
            self.engine
                .log_bus()
                .error(format!("Failed to load profile {}: {}", uuid, e));
        })?;

        let closed = mode::drain(&self.engine);
        self.metrics.record_drain(closed);

        self.engine.apply(&profile, false).await?;
        self.metrics.record_apply(false);

        info!(profile = uuid, path = %path.display(), closed, "Profile applied");
        handle.active_profile = Some(path);
        Ok(())
    }

    /// Path of the last profile applied, if any
    pub async fn active_profile(&self) -> Option<PathBuf> {
        self.handle
            .read()
            .await
            .as_ref()
            .and_then(|h| h.active_profile.clone())
    }

    /// JSON snapshot of the base `general` section
    pub async fn base_config_snapshot(&self) -> Option<Vec<u8>> {
        self.handle.read().await.as_ref()?.general_snapshot()
    }

    /// Apply-all selector patch.
    pub async fn patch_selectors(&self, data: &[u8]) -> Result<PatchReport> {
        let _guard = self.initialized_write().await?;
        let patch = selector::decode_patch(data).inspect_err(|e| self.reject_patch(e))?;

        let report = selector::apply_all(&self.engine, &patch).await;
        for _ in &report.applied {
            self.metrics.record_patch_applied();
        }
        for (_, reason) in &report.skipped {
            self.metrics.record_patch_skipped(reason);
        }
        debug!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Selector patch finished"
        );
        Ok(report)
    }

    /// Apply-first-success selector patch. `false` covers every failure.
    pub async fn patch_first_selector(&self, data: &[u8]) -> bool {
        let Ok(_guard) = self.initialized_write().await else {
            return false;
        };
        let Ok(patch) = selector::decode_patch(data).inspect_err(|e| self.reject_patch(e)) else {
            return false;
        };

        match selector::apply_first_success(&self.engine, &patch).await {
            Some(_) => {
                self.metrics.record_patch_applied();
                true
            }
            None => false,
        }
    }

    /// Switch the tunnel mode, closing all open connections first.
    pub async fn set_tunnel_mode(&self, name: &str) -> Result<()> {
        let _guard = self.initialized_write().await?;
        let mode = mode::parse_mode(name).inspect_err(|_| {
            warn!(mode = name, "Rejected tunnel mode");
            self.engine
                .log_bus()
                .warning(format!("Unknown tunnel mode: {}", name));
        })?;

        let closed = mode::switch_mode(&self.engine, mode).await;
        self.metrics.record_drain(closed);
        self.metrics.record_mode_switch();
        Ok(())
    }

    /// Probe one proxy and keep the detailed outcome.
    pub async fn probe(&self, name: &str, url: &str, timeout: Duration) -> ProbeOutcome {
        let outcome = if self.is_initialized().await {
            probe::probe(&self.engine, name, url, timeout).await
        } else {
            ProbeOutcome::Missing
        };
        self.metrics.record_probe(&outcome);
        outcome
    }

    /// Probe latency in milliseconds; 0 when there is no result.
    pub async fn probe_latency(&self, name: &str, url: &str, timeout_ms: u64) -> u64 {
        self.probe(name, url, Duration::from_millis(timeout_ms))
            .await
            .millis()
    }

    /// Set the minimum level of relayed log events.
    pub async fn set_log_level(&self, name: &str) -> Result<()> {
        if !self.is_initialized().await {
            return Err(ControlError::Uninitialized);
        }
        let level = name
            .parse::<LogLevel>()
            .map_err(|_| ControlError::InvalidLogLevel(name.to_string()))?;
        self.engine.log_bus().set_level(level);
        info!(level = %level, "Log level changed");
        Ok(())
    }

    /// Register, replace or clear the host sink.
    pub async fn set_sink(&self, sink: Option<Arc<dyn HostSink>>) {
        self.sink.set(sink).await;
    }

    /// Number of relay tasks still running
    pub async fn running_relays(&self) -> usize {
        self.relays.lock().await.running()
    }

    /// Stop every relay started by `setup`.
    pub async fn shutdown(&self) {
        self.relays.lock().await.shutdown().await;
    }

    fn reject_patch(&self, e: &ControlError) {
        warn!(error = %e, "Rejected selector patch");
        self.engine
            .log_bus()
            .warning(format!("Rejected selector patch: {}", e));
    }

    async fn initialized_write(&self) -> Result<tokio::sync::RwLockWriteGuard<'_, Option<EngineHandle>>> {
        let guard = self.handle.write().await;
        if guard.is_none() {
            return Err(ControlError::Uninitialized);
        }
        Ok(guard)
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}
