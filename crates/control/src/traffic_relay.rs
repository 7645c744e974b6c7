//! Periodic sampling of the cumulative traffic counters.

use crate::metrics::ControlMetrics;
use crate::sink::SinkSlot;
use crate::types::TrafficSample;
use engine::StatisticsManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// Traffic relay task
pub struct TrafficRelay {
    statistics: Arc<StatisticsManager>,
    sink: SinkSlot,
    metrics: Arc<ControlMetrics>,
    period: Duration,
}

impl TrafficRelay {
    pub fn new(
        statistics: Arc<StatisticsManager>,
        sink: SinkSlot,
        metrics: Arc<ControlMetrics>,
        period: Duration,
    ) -> Self {
        Self {
            statistics,
            sink,
            metrics,
            period,
        }
    }

    /// Run until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!(period_ms = self.period.as_millis(), "Traffic relay started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Traffic relay stopped");
    }

    /// Forward one sample. Returns it when a sink received it.
    pub async fn tick(&self) -> Option<TrafficSample> {
        let sink = self.sink.get().await?;

        let (upload_total, download_total) = self.statistics.totals();
        sink.on_traffic(upload_total, download_total);
        self.metrics.record_traffic_sample();
        trace!(upload_total, download_total, "Traffic sample sent");

        Some(TrafficSample {
            upload_total,
            download_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockHostSink;
    use engine::Metadata;

    #[tokio::test]
    async fn test_tick_without_sink_is_noop() {
        let metrics = Arc::new(ControlMetrics::new());
        let relay = TrafficRelay::new(
            StatisticsManager::new(),
            SinkSlot::new(),
            metrics.clone(),
            Duration::from_secs(1),
        );

        assert!(relay.tick().await.is_none());
        assert_eq!(metrics.traffic_samples(), 0);
    }

    #[tokio::test]
    async fn test_tick_forwards_totals_verbatim() {
        let statistics = StatisticsManager::new();
        let conn = statistics.track(Metadata::default());
        conn.record_upload(300);
        conn.record_download(4000);

        let mut mock = MockHostSink::new();
        mock.expect_on_traffic()
            .withf(|up, down| *up == 300 && *down == 4000)
            .times(1)
            .return_const(());
        let sink = SinkSlot::new();
        sink.set(Some(Arc::new(mock))).await;

        let relay = TrafficRelay::new(
            statistics,
            sink,
            Arc::new(ControlMetrics::new()),
            Duration::from_secs(1),
        );

        let sample = relay.tick().await.unwrap();
        assert_eq!(
            sample,
            TrafficSample {
                upload_total: 300,
                download_total: 4000
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_once_per_period() {
        let metrics = Arc::new(ControlMetrics::new());
        let mut mock = MockHostSink::new();
        mock.expect_on_traffic().times(3).return_const(());
        let sink = SinkSlot::new();
        sink.set(Some(Arc::new(mock))).await;

        let relay = TrafficRelay::new(
            StatisticsManager::new(),
            sink,
            metrics.clone(),
            Duration::from_secs(1),
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(relay.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(metrics.traffic_samples(), 3);
    }
}
