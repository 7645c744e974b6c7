//! Control façade for the embedded routing engine.
//!
//! A host application drives the engine through [`Control`]:
//!
//! - **Lifecycle**: one-time setup from a serialized configuration, restricted
//!   profile reloads, and a snapshot of the base listening settings
//! - **Relays**: background tasks forwarding log events and cumulative
//!   traffic totals to a host-registered [`HostSink`]
//! - **Selector patches**: batch updates of selector groups, with an
//!   apply-all and an apply-first-success policy
//! - **Tunnel mode**: mode switches that close open connections first
//! - **Latency probe**: a single URL test bounded by a caller timeout
//!
//! Telemetry only flows engine to host. Neither relay ever blocks the engine:
//! log events are dropped when the relay buffer is full.
//!
//! # Example
//!
//! ```no_run
//! use control::Control;
//!
//! # async fn example() -> control::Result<()> {
//! let control = Control::new();
//! control.setup("/data/tunnel", b"mixed-port: 7890\n", None).await?;
//!
//! control.set_tunnel_mode("global").await?;
//! let millis = control.probe_latency("DIRECT", "http://www.gstatic.com/generate_204", 3000).await;
//! # let _ = millis;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod lifecycle;
pub mod log_relay;
pub mod metrics;
pub mod mode;
pub mod probe;
pub mod selector;
pub mod sink;
pub mod traffic_relay;
pub mod types;

pub use config::{Settings, SettingsError};
pub use error::{ControlError, Result};
pub use facade::Control;
pub use metrics::{ControlMetrics, LogDisposition};
pub use sink::{HostSink, SinkSlot};
pub use types::{PatchReport, ProbeOutcome, RelaySettings, SelectionPatch, SkipReason, TrafficSample};
