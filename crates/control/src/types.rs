//! Types shared by the control operations.

use engine::ProbeError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Requested selections, group name to member name.
///
/// Ordered so the first-success policy walks entries deterministically.
pub type SelectionPatch = BTreeMap<String, String>;

/// Runtime tuning for the relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Capacity of the buffer between the log subscription and delivery
    pub log_buffer: usize,

    /// Queue size of the log bus subscription itself
    pub log_subscription: usize,

    /// Traffic sampling period
    pub traffic_interval: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            log_buffer: 1024,
            log_subscription: 256,
            traffic_interval: Duration::from_secs(1),
        }
    }
}

/// Cumulative traffic counters at one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSample {
    pub upload_total: u64,
    pub download_total: u64,
}

/// Why a patch entry was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No proxy of that name is registered
    UnknownGroup,
    /// The proxy exists but its selection cannot be changed
    NotSelector,
    /// The group has no member of the requested name
    UnknownMember(String),
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UnknownGroup => "unknown_group",
            SkipReason::NotSelector => "not_selector",
            SkipReason::UnknownMember(_) => "unknown_member",
        }
    }
}

/// Per-entry result of an apply-all selector patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Groups whose selection was set
    pub applied: Vec<String>,
    /// Entries left untouched, with the reason
    pub skipped: Vec<(String, SkipReason)>,
}

/// Internal result of a latency probe.
///
/// Hosts only see `millis()`, where every outcome but `Latency` is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Latency(Duration),
    Failed(ProbeError),
    TimedOut,
    Missing,
}

impl ProbeOutcome {
    pub fn millis(&self) -> u64 {
        match self {
            ProbeOutcome::Latency(d) => u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
            _ => 0,
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Latency(_) => "latency",
            ProbeOutcome::Failed(_) => "failed",
            ProbeOutcome::TimedOut => "timed_out",
            ProbeOutcome::Missing => "missing",
        }
    }
}
