//! Integration tests for setup, profiles and shutdown

use control::{Control, ControlError, HostSink};
use engine::{Metadata, TunnelMode};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const BASE: &str = r#"
port: 7890
socks-port: 7891
allow-lan: true
bind-address: "*"
mode: rule
log-level: info
proxies:
  - { name: hk, type: ss, server: hk.example.com, port: 8388 }
proxy-groups:
  - { name: main, type: select, proxies: [hk, DIRECT] }
rules:
  - MATCH,main
"#;

const PROFILE: &str = r#"
port: 1
mode: direct
dns:
  enable: true
profile:
  store-selected: true
proxies:
  - { name: jp, type: vmess, server: jp.example.com, port: 443 }
proxy-groups:
  - { name: main, type: select, proxies: [jp, DIRECT] }
rules:
  - DOMAIN-SUFFIX,example.com,main
  - MATCH,DIRECT
"#;

#[derive(Default)]
struct RecordingSink {
    traffic: Mutex<Vec<(u64, u64)>>,
}

impl HostSink for RecordingSink {
    fn on_traffic(&self, upload_total: u64, download_total: u64) {
        self.traffic.lock().unwrap().push((upload_total, download_total));
    }

    fn on_log(&self, _kind: &str, _payload: &str) {}
}

fn write_profile(home: &Path, uuid: &str, body: &str) {
    let dir = home.join(uuid);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.yaml"), body).unwrap();
}

async fn initialized(home: &TempDir) -> Control {
    let control = Control::new();
    control.setup(home.path(), BASE.as_bytes(), None).await.unwrap();
    control
}

#[tokio::test]
async fn test_setup_snapshot_matches_general() {
    let home = TempDir::new().unwrap();
    let control = initialized(&home).await;

    assert!(control.is_initialized().await);
    let snapshot = control.base_config_snapshot().await.unwrap();
    let general: serde_json::Value = serde_json::from_slice(&snapshot).unwrap();

    assert_eq!(general["port"], 7890);
    assert_eq!(general["socks-port"], 7891);
    assert_eq!(general["allow-lan"], true);
    assert_eq!(general["bind-address"], "*");
    assert_eq!(general["mode"], "rule");
    assert_eq!(general["log-level"], "info");
    assert!(general.get("proxies").is_none());

    assert_eq!(control.running_relays().await, 2);
    control.shutdown().await;
}

#[tokio::test]
async fn test_malformed_setup_leaves_everything_uninitialized() {
    let home = TempDir::new().unwrap();
    let control = Control::new();

    let result = control
        .setup(home.path(), b"proxy-groups: [ {name: a, type: select", None)
        .await;
    assert!(matches!(result, Err(ControlError::ConfigParse(_))));

    assert!(!control.is_initialized().await);
    assert!(control.base_config_snapshot().await.is_none());
    assert_eq!(control.running_relays().await, 0);
    assert!(matches!(
        control.set_tunnel_mode("global").await,
        Err(ControlError::Uninitialized)
    ));
    assert!(matches!(
        control.patch_selectors(br#"{"GLOBAL":"DIRECT"}"#).await,
        Err(ControlError::Uninitialized)
    ));
    assert!(!control.patch_first_selector(br#"{"GLOBAL":"DIRECT"}"#).await);
    assert!(matches!(
        control.set_log_level("debug").await,
        Err(ControlError::Uninitialized)
    ));
    assert!(matches!(
        control.apply_profile("any").await,
        Err(ControlError::Uninitialized)
    ));
    assert_eq!(control.probe_latency("REJECT", "http://example.com", 100).await, 0);
    assert_eq!(control.engine().mode().await, TunnelMode::Rule);
}

#[tokio::test]
async fn test_invalid_references_fail_setup() {
    let home = TempDir::new().unwrap();
    let control = Control::new();

    let result = control
        .setup(
            home.path(),
            b"proxy-groups:\n  - { name: g, type: select, proxies: [ghost] }\n",
            None,
        )
        .await;

    assert!(matches!(result, Err(ControlError::ConfigParse(_))));
    assert!(!control.is_initialized().await);
}

#[tokio::test]
async fn test_apply_profile_is_restricted_reload() {
    let home = TempDir::new().unwrap();
    write_profile(home.path(), "p1", PROFILE);
    let control = initialized(&home).await;
    let engine = control.engine().clone();
    let conn = engine.statistics().track(Metadata::default());

    tokio_test::assert_ok!(control.apply_profile("p1").await);

    // Connections from the old configuration are gone
    assert!(conn.is_closed());
    assert_eq!(control.metrics().connections_drained(), 1);

    // Proxies and rules come from the profile
    assert!(engine.proxy("jp").await.is_some());
    assert!(engine.proxy("hk").await.is_none());
    assert_eq!(engine.rules().await.len(), 2);

    // Listeners, mode and DNS stay with the base
    assert_eq!(engine.listeners().await.unwrap().port, 7890);
    assert_eq!(engine.mode().await, TunnelMode::Rule);
    assert!(!engine.dns_enabled());

    // The base configuration is not replaced
    let general: serde_json::Value =
        serde_json::from_slice(&control.base_config_snapshot().await.unwrap()).unwrap();
    assert_eq!(general["port"], 7890);

    assert_eq!(
        control.active_profile().await.unwrap(),
        home.path().join("p1").join("config.yaml")
    );
    control.shutdown().await;
}

#[tokio::test]
async fn test_apply_missing_profile() {
    let home = TempDir::new().unwrap();
    let control = initialized(&home).await;
    let conn = control
        .engine()
        .statistics()
        .track(Metadata::default());

    let result = control.apply_profile("absent").await;

    assert!(matches!(result, Err(ControlError::ProfileIo { .. })));
    assert!(!conn.is_closed());
    assert!(control.engine().proxy("hk").await.is_some());
    assert!(control.active_profile().await.is_none());
    control.shutdown().await;
}

#[tokio::test]
async fn test_apply_malformed_profile_keeps_previous() {
    let home = TempDir::new().unwrap();
    write_profile(home.path(), "good", PROFILE);
    write_profile(home.path(), "bad", "rules: {not: [a list\n");
    let control = initialized(&home).await;

    tokio_test::assert_ok!(control.apply_profile("good").await);
    let result = control.apply_profile("bad").await;

    assert!(matches!(result, Err(ControlError::ConfigParse(_))));
    assert!(control.engine().proxy("jp").await.is_some());
    assert_eq!(
        control.active_profile().await.unwrap(),
        home.path().join("good").join("config.yaml")
    );
    control.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_relays() {
    let home = TempDir::new().unwrap();
    let control = initialized(&home).await;
    while control.engine().log_bus().subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    control.shutdown().await;

    assert_eq!(control.running_relays().await, 0);
    assert_eq!(control.engine().log_bus().subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_settings_file_tunes_traffic_interval() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("control.yaml"),
        "relay:\n  traffic_interval: 250ms\n",
    )
    .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let control = Control::new();
    control
        .setup(home.path(), BASE.as_bytes(), Some(sink.clone() as Arc<dyn HostSink>))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    control.shutdown().await;

    assert_eq!(sink.traffic.lock().unwrap().len(), 4);
}
