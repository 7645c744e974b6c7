//! Error type for the shared helpers.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    pub fn logging(msg: impl fmt::Display) -> Self {
        Error::Logging(msg.to_string())
    }
}
