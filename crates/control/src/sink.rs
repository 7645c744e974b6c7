//! Host-supplied telemetry receiver.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Receiver for relayed telemetry.
///
/// Callbacks run on relay tasks and should return promptly; a sink that
/// blocks longer than the traffic interval delays the next sample.
#[cfg_attr(test, mockall::automock)]
pub trait HostSink: Send + Sync {
    /// Cumulative byte totals since the engine started
    fn on_traffic(&self, upload_total: u64, download_total: u64);

    /// One log event; `kind` is the level name
    fn on_log(&self, kind: &str, payload: &str);
}

/// The currently registered sink, replaceable at any time.
///
/// Relays clone the `Arc` out before calling it, so a concurrent
/// replacement lets an in-flight delivery finish on the old sink.
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<Option<Arc<dyn HostSink>>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Arc<dyn HostSink>> {
        self.inner.read().await.clone()
    }

    /// Register or clear the sink.
    pub async fn set(&self, sink: Option<Arc<dyn HostSink>>) {
        *self.inner.write().await = sink;
    }

    pub async fn is_registered(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
