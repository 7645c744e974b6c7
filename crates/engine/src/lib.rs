//! Embedded proxy-routing engine surface.
//!
//! This crate holds the pieces of the routing engine the control layer
//! observes and steers:
//! - configuration parsing and validation
//! - the proxy registry (adapters, selectors and other groups)
//! - connection tracking and cumulative traffic counters
//! - the log bus
//!
//! Protocol adapters, rule evaluation and packet transport live outside this
//! crate. Remote proxies are represented by their server address only.
//!
//! # Example
//!
//! ```no_run
//! use engine::{Configuration, Engine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::from_bytes(b"mixed-port: 7890\nmode: rule\n")?;
//!
//! let engine = Engine::new();
//! engine.apply(&config, true).await?;
//!
//! let (up, down) = engine.statistics().totals();
//! let mode = engine.mode().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod statistic;
pub mod types;

pub use adapter::{DirectAdapter, ProxyAdapter, RejectAdapter, RemoteAdapter, Selector, StaticGroup};
pub use config::{Configuration, General, GroupKind, GroupSpec, ProxySpec};
pub use engine::Engine;
pub use error::{ConfigError, ProbeError, SelectError};
pub use log::{LogBus, LogEvent, Subscription};
pub use statistic::{ConnectionSnapshot, Metadata, StatisticsManager, TrackedConnection};
pub use types::{AdapterType, LogLevel, TunnelMode, UnknownName};
