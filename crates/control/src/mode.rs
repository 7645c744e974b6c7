//! Tunnel mode switch and the connection drain it relies on.

use crate::error::{ControlError, Result};
use engine::{Engine, TunnelMode};
use tracing::{debug, info};

/// Parse a host-supplied mode name.
pub fn parse_mode(name: &str) -> Result<TunnelMode> {
    name.parse::<TunnelMode>()
        .map_err(|_| ControlError::InvalidMode(name.to_string()))
}

/// Close every connection open at the time of the call.
///
/// Returns how many were closed. Connections opened after the snapshot are
/// left alone.
pub fn drain(engine: &Engine) -> usize {
    let snapshot = engine.statistics().snapshot();
    for connection in &snapshot.connections {
        debug!(
            id = connection.id(),
            host = %connection.metadata().host,
            "Closing connection"
        );
        connection.close();
    }

    let closed = snapshot.connections.len();
    if closed > 0 {
        info!(closed, "Connections drained");
        engine
            .log_bus()
            .info(format!("Closed {} connections", closed));
    }
    closed
}

/// Drain, then commit `mode`. Returns the number of connections closed.
pub async fn switch_mode(engine: &Engine, mode: TunnelMode) -> usize {
    let closed = drain(engine);
    engine.set_mode(mode).await;
    closed
}
