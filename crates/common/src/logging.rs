//! Tracing subscriber setup for embedders.

use crate::error::{Error, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Try to install a subscriber, returning an error instead of panicking when
/// one is already installed.
///
/// `RUST_LOG` wins over `default_level` when set. Host entry points may run
/// more than once, so a second call reports `Error::Logging`.
pub fn try_init(default_level: &str, json: bool) -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter(default_level));
    if json {
        registry.with(fmt::layer().json()).try_init().map_err(Error::logging)
    } else {
        registry.with(fmt::layer()).try_init().map_err(Error::logging)
    }
}
