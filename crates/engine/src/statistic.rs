//! Connection tracking and traffic counters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Addressing information for a tracked connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// "tcp" or "udp"
    pub network: String,
    pub host: String,
    pub destination_port: u16,
}

/// An open connection known to the statistics manager
#[derive(Debug)]
pub struct TrackedConnection {
    id: u64,
    metadata: Metadata,
    upload: AtomicU64,
    download: AtomicU64,
    closed: CancellationToken,
    manager: Weak<StatisticsManager>,
}

impl TrackedConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn upload(&self) -> u64 {
        self.upload.load(Ordering::Relaxed)
    }

    pub fn download(&self) -> u64 {
        self.download.load(Ordering::Relaxed)
    }

    /// Count bytes sent by the client. Also feeds the manager totals.
    pub fn record_upload(&self, bytes: u64) {
        self.upload.fetch_add(bytes, Ordering::Relaxed);
        if let Some(manager) = self.manager.upgrade() {
            manager.push_uploaded(bytes);
        }
    }

    /// Count bytes received from the remote. Also feeds the manager totals.
    pub fn record_download(&self, bytes: u64) {
        self.download.fetch_add(bytes, Ordering::Relaxed);
        if let Some(manager) = self.manager.upgrade() {
            manager.push_downloaded(bytes);
        }
    }

    /// Close the connection and stop tracking it. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
        if let Some(manager) = self.manager.upgrade() {
            manager.leave(self.id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once `close` has been called; the forwarding path selects on it.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Point-in-time view of the open connections and the counters
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub upload_total: u64,
    pub download_total: u64,
    pub connections: Vec<Arc<TrackedConnection>>,
}

/// Tracks open connections and cumulative traffic
#[derive(Debug, Default)]
pub struct StatisticsManager {
    connections: DashMap<u64, Arc<TrackedConnection>>,
    next_id: AtomicU64,
    upload_total: AtomicU64,
    download_total: AtomicU64,
}

impl StatisticsManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start tracking a new connection.
    pub fn track(self: &Arc<Self>, metadata: Metadata) -> Arc<TrackedConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let conn = Arc::new(TrackedConnection {
            id,
            metadata,
            upload: AtomicU64::new(0),
            download: AtomicU64::new(0),
            closed: CancellationToken::new(),
            manager: Arc::downgrade(self),
        });
        self.connections.insert(id, conn.clone());
        debug!(id, host = %conn.metadata.host, "Tracking connection");
        conn
    }

    fn leave(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            debug!(id, "Connection closed");
        }
    }

    pub fn push_uploaded(&self, bytes: u64) {
        self.upload_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn push_downloaded(&self, bytes: u64) {
        self.download_total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Cumulative (upload, download) byte totals since start.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.upload_total.load(Ordering::Relaxed),
            self.download_total.load(Ordering::Relaxed),
        )
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let (upload_total, download_total) = self.totals();
        ConnectionSnapshot {
            upload_total,
            download_total,
            connections: self.connections.iter().map(|e| e.value().clone()).collect(),
        }
    }
}
