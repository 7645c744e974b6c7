//! In-process log bus.
//!
//! Every published event is offered to every subscriber without blocking the
//! publisher. A subscriber whose queue is full misses the event; a subscriber
//! whose receiver was dropped is removed on the next publish.

use crate::types::LogLevel;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub payload: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, payload: impl Into<String>) -> Self {
        Self {
            level,
            payload: payload.into(),
        }
    }

    /// Kind reported to hosts; the level name.
    pub fn kind(&self) -> &'static str {
        self.level.as_str()
    }
}

/// Receiving half of a bus subscription
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<LogEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.rx.try_recv().ok()
    }
}

/// Publish/subscribe hub for engine log events
#[derive(Debug)]
pub struct LogBus {
    subscribers: DashMap<u64, mpsc::Sender<LogEvent>>,
    next_id: AtomicU64,
    level: AtomicU8,
}

impl LogBus {
    pub fn new(level: LogLevel) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            level: AtomicU8::new(level.to_u8()),
        }
    }

    /// Current minimum level consumers should deliver.
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.to_u8(), Ordering::Relaxed);
    }

    /// Register a subscriber with its own queue of `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.insert(id, tx);
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Offer an event to every subscriber. Returns how many accepted it.
    ///
    /// Level filtering is left to subscribers; the bus carries everything.
    pub fn publish(&self, event: LogEvent) -> usize {
        let mut accepted = 0;
        self.subscribers
            .retain(|_, tx| match tx.try_send(event.clone()) {
                Ok(()) => {
                    accepted += 1;
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        accepted
    }

    pub fn debug(&self, payload: impl Into<String>) {
        self.publish(LogEvent::new(LogLevel::Debug, payload));
    }

    pub fn info(&self, payload: impl Into<String>) {
        self.publish(LogEvent::new(LogLevel::Info, payload));
    }

    pub fn warning(&self, payload: impl Into<String>) {
        self.publish(LogEvent::new(LogLevel::Warning, payload));
    }

    pub fn error(&self, payload: impl Into<String>) {
        self.publish(LogEvent::new(LogLevel::Error, payload));
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}
