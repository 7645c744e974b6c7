//! Engine handle, profile loading and relay supervision.

use crate::error::Result;
use crate::log_relay::LogRelay;
use crate::traffic_relay::TrafficRelay;
use engine::{Configuration, General};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Profile file name inside `<home>/<uuid>/`
pub const PROFILE_FILE: &str = "config.yaml";

/// State held once the engine has been set up
#[derive(Debug, Clone)]
pub struct EngineHandle {
    pub home_dir: PathBuf,

    /// Configuration passed to setup
    pub base: Configuration,

    /// Path of the last profile applied on top of the base
    pub active_profile: Option<PathBuf>,
}

impl EngineHandle {
    pub fn new(home_dir: PathBuf, base: Configuration) -> Self {
        Self {
            home_dir,
            base,
            active_profile: None,
        }
    }

    pub fn profile_path(&self, uuid: &str) -> PathBuf {
        profile_path(&self.home_dir, uuid)
    }

    /// Load the profile `uuid` and restrict it to what a profile may change.
    pub fn load_profile(&self, uuid: &str) -> Result<(PathBuf, Configuration)> {
        let path = self.profile_path(uuid);
        let mut profile = Configuration::from_path(&path)?;
        restrict_profile(&mut profile, &self.base.general);
        Ok((path, profile))
    }

    /// JSON form of the base `general` section
    pub fn general_snapshot(&self) -> Option<Vec<u8>> {
        match serde_json::to_vec(&self.base.general) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Failed to serialize base configuration");
                None
            }
        }
    }
}

pub fn profile_path(home_dir: &Path, uuid: &str) -> PathBuf {
    home_dir.join(uuid).join(PROFILE_FILE)
}

/// Pin a profile to the base listeners and switch off what it may not own.
pub fn restrict_profile(profile: &mut Configuration, base: &General) {
    profile.general = base.clone();
    profile.dns.enable = false;
    profile.profile.store_selected = false;
}

/// Owns the relay tasks and the token that stops them
pub struct RelaySupervisor {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RelaySupervisor {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn a relay pair. Each call adds a pair; all stop together.
    pub fn start(&mut self, log_relay: LogRelay, traffic_relay: TrafficRelay) {
        self.handles.retain(|h| !h.is_finished());
        self.handles.push(tokio::spawn(log_relay.run(self.token.child_token())));
        self.handles
            .push(tokio::spawn(traffic_relay.run(self.token.child_token())));
        info!(running = self.handles.len(), "Relays started");
    }

    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Cancel every relay and wait for them to finish.
    pub async fn shutdown(&mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Relay task ended abnormally");
            }
        }
        self.token = CancellationToken::new();
        info!("Relays stopped");
    }
}

impl Default for RelaySupervisor {
    fn default() -> Self {
        Self::new()
    }
}
