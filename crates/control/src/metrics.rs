//! Prometheus metrics for the control façade.

use crate::types::{ProbeOutcome, SkipReason};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// What happened to a log event inside the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDisposition {
    /// Handed to the host sink
    Delivered,
    /// Relay buffer was full
    Dropped,
    /// Below the current minimum level
    Filtered,
    /// No sink registered
    Discarded,
}

impl LogDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDisposition::Delivered => "delivered",
            LogDisposition::Dropped => "dropped",
            LogDisposition::Filtered => "filtered",
            LogDisposition::Discarded => "discarded",
        }
    }
}

/// Labels for log relay metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LogLabels {
    /// delivered, dropped, filtered, discarded
    pub disposition: String,
}

/// Labels for selector patch metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PatchLabels {
    /// applied, unknown_group, not_selector, unknown_member
    pub result: String,
}

/// Labels for probe metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// latency, failed, timed_out, missing
    pub outcome: String,
}

/// Labels for configuration applies
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ApplyLabels {
    /// base or profile
    pub kind: String,
}

/// Metrics registry with all control façade metrics
pub struct ControlMetrics {
    /// Prometheus registry
    pub registry: Registry,

    log_events_total: Family<LogLabels, Counter>,
    traffic_samples_total: Counter,
    patch_entries_total: Family<PatchLabels, Counter>,
    probes_total: Family<ProbeLabels, Counter>,
    probe_latency_seconds: Histogram,
    connections_drained_total: Counter,
    mode_switches_total: Counter,
    config_applies_total: Family<ApplyLabels, Counter>,
}

impl ControlMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let log_events_total = Family::<LogLabels, Counter>::default();
        registry.register(
            "control_log_events",
            "Log events seen by the log relay, by disposition",
            log_events_total.clone(),
        );

        let traffic_samples_total = Counter::default();
        registry.register(
            "control_traffic_samples",
            "Traffic samples forwarded to the host sink",
            traffic_samples_total.clone(),
        );

        let patch_entries_total = Family::<PatchLabels, Counter>::default();
        registry.register(
            "control_patch_entries",
            "Selector patch entries by result",
            patch_entries_total.clone(),
        );

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "control_probes",
            "Latency probes by outcome",
            probes_total.clone(),
        );

        // 1ms to ~16s
        let probe_latency_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "control_probe_latency_seconds",
            "Measured latency of successful probes",
            probe_latency_seconds.clone(),
        );

        let connections_drained_total = Counter::default();
        registry.register(
            "control_connections_drained",
            "Connections closed by drains",
            connections_drained_total.clone(),
        );

        let mode_switches_total = Counter::default();
        registry.register(
            "control_mode_switches",
            "Committed tunnel mode switches",
            mode_switches_total.clone(),
        );

        let config_applies_total = Family::<ApplyLabels, Counter>::default();
        registry.register(
            "control_config_applies",
            "Configurations applied to the engine",
            config_applies_total.clone(),
        );

        Self {
            registry,
            log_events_total,
            traffic_samples_total,
            patch_entries_total,
            probes_total,
            probe_latency_seconds,
            connections_drained_total,
            mode_switches_total,
            config_applies_total,
        }
    }

    pub fn record_log_event(&self, disposition: LogDisposition) {
        self.log_events_total
            .get_or_create(&LogLabels {
                disposition: disposition.as_str().to_string(),
            })
            .inc();
    }

    pub fn log_events(&self, disposition: LogDisposition) -> u64 {
        self.log_events_total
            .get_or_create(&LogLabels {
                disposition: disposition.as_str().to_string(),
            })
            .get()
    }

    pub fn record_traffic_sample(&self) {
        self.traffic_samples_total.inc();
    }

    pub fn traffic_samples(&self) -> u64 {
        self.traffic_samples_total.get()
    }

    pub fn record_patch_applied(&self) {
        self.patch_entries_total
            .get_or_create(&PatchLabels {
                result: "applied".to_string(),
            })
            .inc();
    }

    pub fn record_patch_skipped(&self, reason: &SkipReason) {
        self.patch_entries_total
            .get_or_create(&PatchLabels {
                result: reason.as_str().to_string(),
            })
            .inc();
    }

    /// Record a probe result and, for successes, its latency
    pub fn record_probe(&self, outcome: &ProbeOutcome) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();

        if let ProbeOutcome::Latency(latency) = outcome {
            self.probe_latency_seconds.observe(latency.as_secs_f64());
        }
    }

    pub fn probes(&self, outcome: &str) -> u64 {
        self.probes_total
            .get_or_create(&ProbeLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }

    pub fn record_drain(&self, closed: usize) {
        self.connections_drained_total.inc_by(closed as u64);
    }

    pub fn connections_drained(&self) -> u64 {
        self.connections_drained_total.get()
    }

    pub fn record_mode_switch(&self) {
        self.mode_switches_total.inc();
    }

    pub fn record_apply(&self, is_base: bool) {
        let kind = if is_base { "base" } else { "profile" };
        self.config_applies_total
            .get_or_create(&ApplyLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    /// Render the registry in the text exposition format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

impl Default for ControlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_creation() {
        let metrics = ControlMetrics::new();
        assert_eq!(metrics.traffic_samples(), 0);
        assert_eq!(metrics.log_events(LogDisposition::Delivered), 0);
    }

    #[test]
    fn test_log_dispositions_are_counted_separately() {
        let metrics = ControlMetrics::new();
        metrics.record_log_event(LogDisposition::Delivered);
        metrics.record_log_event(LogDisposition::Delivered);
        metrics.record_log_event(LogDisposition::Dropped);

        assert_eq!(metrics.log_events(LogDisposition::Delivered), 2);
        assert_eq!(metrics.log_events(LogDisposition::Dropped), 1);
        assert_eq!(metrics.log_events(LogDisposition::Filtered), 0);
    }

    #[test]
    fn test_probe_outcomes() {
        let metrics = ControlMetrics::new();
        metrics.record_probe(&ProbeOutcome::Latency(Duration::from_millis(30)));
        metrics.record_probe(&ProbeOutcome::TimedOut);
        metrics.record_probe(&ProbeOutcome::Missing);

        assert_eq!(metrics.probes("latency"), 1);
        assert_eq!(metrics.probes("timed_out"), 1);
        assert_eq!(metrics.probes("failed"), 0);
    }

    #[test]
    fn test_encode_contains_registered_metrics() {
        let metrics = ControlMetrics::new();
        metrics.record_drain(3);
        metrics.record_mode_switch();
        metrics.record_patch_skipped(&SkipReason::NotSelector);
        metrics.record_apply(true);

        let text = metrics.encode();
        assert!(text.contains("control_connections_drained_total 3"));
        assert!(text.contains("control_mode_switches_total 1"));
        assert!(text.contains("result=\"not_selector\""));
        assert!(text.contains("kind=\"base\""));
    }
}
