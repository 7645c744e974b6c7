//! Relay from the engine log bus to the host sink.
//!
//! A pump task moves events from the bus subscription into a bounded relay
//! buffer with `try_send`, so a slow or missing host never backs up the bus.
//! Events that find the buffer full are dropped. The delivery loop drains the
//! buffer in order, filters by the bus's current level and calls the sink.

use crate::metrics::{ControlMetrics, LogDisposition};
use crate::sink::SinkSlot;
use engine::{LogBus, LogEvent};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Log relay task
pub struct LogRelay {
    bus: Arc<LogBus>,
    sink: SinkSlot,
    metrics: Arc<ControlMetrics>,

    /// Relay buffer capacity
    buffer_size: usize,

    /// Bus subscription queue size
    subscription_size: usize,
}

impl LogRelay {
    /// Create a new log relay
    pub fn new(
        bus: Arc<LogBus>,
        sink: SinkSlot,
        metrics: Arc<ControlMetrics>,
        buffer_size: usize,
        subscription_size: usize,
    ) -> Self {
        Self {
            bus,
            sink,
            metrics,
            buffer_size: buffer_size.max(1),
            subscription_size,
        }
    }

    /// Run until `token` is cancelled or the bus goes away.
    pub async fn run(self, token: CancellationToken) {
        let mut subscription = self.bus.subscribe(self.subscription_size);
        let subscription_id = subscription.id();
        info!(
            subscription = subscription_id,
            buffer = self.buffer_size,
            "Log relay started"
        );

        let (buffer_tx, mut buffer_rx) = mpsc::channel::<LogEvent>(self.buffer_size);

        let pump_token = token.clone();
        let pump_metrics = self.metrics.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_token.cancelled() => break,
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        match buffer_tx.try_send(event) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                pump_metrics.record_log_event(LogDisposition::Dropped);
                            }
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = buffer_rx.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
            }
        }

        buffer_rx.close();
        let _ = pump.await;
        self.bus.unsubscribe(subscription_id);
        info!(subscription = subscription_id, "Log relay stopped");
    }

    async fn deliver(&self, event: LogEvent) {
        // The level can change at any time, so it is read per event.
        if event.level < self.bus.level() {
            self.metrics.record_log_event(LogDisposition::Filtered);
            return;
        }

        match self.sink.get().await {
            Some(sink) => {
                sink.on_log(event.kind(), &event.payload);
                self.metrics.record_log_event(LogDisposition::Delivered);
            }
            None => {
                debug!(level = %event.level, "No sink registered, discarding log event");
                self.metrics.record_log_event(LogDisposition::Discarded);
            }
        }
    }
}
