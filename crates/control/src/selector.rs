//! Selector patch protocol.
//!
//! Two policies over the same input:
//! - `apply_all` walks every registered group and sets those named in the
//!   patch, skipping anything that does not apply.
//! - `apply_first_success` walks the patch and stops at the first group it
//!   manages to update.

use crate::error::Result;
use crate::types::{PatchReport, SelectionPatch, SkipReason};
use engine::{Engine, ProxyAdapter};
use tracing::{debug, info};

/// Decode a JSON object of group name to member name.
pub fn decode_patch(data: &[u8]) -> Result<SelectionPatch> {
    Ok(serde_json::from_slice(data)?)
}

fn try_select(proxy: &dyn ProxyAdapter, member: &str) -> std::result::Result<(), SkipReason> {
    let selector = proxy.as_selector().ok_or(SkipReason::NotSelector)?;
    selector
        .set(member)
        .map_err(|_| SkipReason::UnknownMember(member.to_string()))
}

/// Apply every entry that names a selector with a matching member.
pub async fn apply_all(engine: &Engine, patch: &SelectionPatch) -> PatchReport {
    let proxies = engine.proxies().await;
    let mut report = PatchReport::default();

    for (name, proxy) in &proxies {
        let Some(member) = patch.get(name) else {
            continue;
        };
        match try_select(proxy.as_ref(), member) {
            Ok(()) => {
                info!(group = %name, selected = %member, "Selection patched");
                report.applied.push(name.clone());
            }
            Err(reason) => {
                debug!(group = %name, member = %member, reason = reason.as_str(), "Patch entry skipped");
                report.skipped.push((name.clone(), reason));
            }
        }
    }

    for name in patch.keys().filter(|name| !proxies.contains_key(*name)) {
        debug!(group = %name, "Patch names unknown group");
        report.skipped.push((name.clone(), SkipReason::UnknownGroup));
    }

    report.applied.sort();
    report.skipped.sort_by(|a, b| a.0.cmp(&b.0));
    report
}

/// Apply entries in name order until one succeeds. Returns the group updated.
pub async fn apply_first_success(engine: &Engine, patch: &SelectionPatch) -> Option<String> {
    for (name, member) in patch {
        let Some(proxy) = engine.proxy(name).await else {
            debug!(group = %name, "Patch names unknown group");
            continue;
        };
        match try_select(proxy.as_ref(), member) {
            Ok(()) => {
                info!(group = %name, selected = %member, "Selection patched");
                return Some(name.clone());
            }
            Err(reason) => {
                debug!(group = %name, member = %member, reason = reason.as_str(), "Patch entry failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use engine::Configuration;

    const CONFIG: &str = r#"
proxies:
  - { name: hk, type: ss, server: hk.example.com, port: 8388 }
  - { name: jp, type: ss, server: jp.example.com, port: 8388 }
proxy-groups:
  - { name: main, type: select, proxies: [hk, jp] }
  - { name: backup, type: select, proxies: [jp, hk] }
  - { name: auto, type: url-test, proxies: [hk, jp] }
"#;

    async fn engine() -> Engine {
        let engine = Engine::new();
        let config = Configuration::from_bytes(CONFIG.as_bytes()).unwrap();
        engine.apply(&config, true).await.unwrap();
        engine
    }

    async fn selected(engine: &Engine, group: &str) -> String {
        let proxy = engine.proxy(group).await.unwrap();
        proxy.as_selector().unwrap().selected().to_string()
    }

    fn patch(entries: &[(&str, &str)]) -> SelectionPatch {
        entries
            .iter()
            .map(|(g, m)| (g.to_string(), m.to_string()))
            .collect()
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            decode_patch(b"[1, 2"),
            Err(ControlError::MalformedPatch(_))
        ));
        assert!(decode_patch(b"{\"main\": 3}").is_err());
        assert_eq!(decode_patch(b"{}").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_apply_all_reports_each_entry() {
        let engine = engine().await;
        let report = apply_all(
            &engine,
            &patch(&[
                ("main", "jp"),
                ("backup", "nowhere"),
                ("auto", "jp"),
                ("gone", "hk"),
            ]),
        )
        .await;

        assert_eq!(report.applied, vec!["main"]);
        assert_eq!(
            report.skipped,
            vec![
                ("auto".to_string(), SkipReason::NotSelector),
                ("backup".to_string(), SkipReason::UnknownMember("nowhere".into())),
                ("gone".to_string(), SkipReason::UnknownGroup),
            ]
        );
        assert_eq!(selected(&engine, "main").await, "jp");
        assert_eq!(selected(&engine, "backup").await, "jp");
    }

    #[tokio::test]
    async fn test_apply_all_leaves_unnamed_groups() {
        let engine = engine().await;
        apply_all(&engine, &patch(&[("backup", "hk")])).await;

        assert_eq!(selected(&engine, "main").await, "hk");
        assert_eq!(selected(&engine, "backup").await, "hk");
    }

    #[tokio::test]
    async fn test_first_success_stops_after_one() {
        let engine = engine().await;
        let updated = apply_first_success(&engine, &patch(&[("backup", "hk"), ("main", "jp")])).await;

        assert_eq!(updated.as_deref(), Some("backup"));
        assert_eq!(selected(&engine, "backup").await, "hk");
        assert_eq!(selected(&engine, "main").await, "hk");
    }

    #[tokio::test]
    async fn test_first_success_tries_next_after_failure() {
        let engine = engine().await;
        let updated = apply_first_success(
            &engine,
            &patch(&[("auto", "jp"), ("backup", "nowhere"), ("main", "jp")]),
        )
        .await;

        assert_eq!(updated.as_deref(), Some("main"));
        assert_eq!(selected(&engine, "main").await, "jp");
    }

    #[tokio::test]
    async fn test_first_success_none_applicable() {
        let engine = engine().await;
        let updated = apply_first_success(&engine, &patch(&[("auto", "jp"), ("gone", "hk")])).await;
        assert!(updated.is_none());
    }
}
