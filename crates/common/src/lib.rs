//! Common utilities and types shared across the tunnel control crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
