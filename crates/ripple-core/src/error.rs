#![forbid(unsafe_code)]

//! Error type for the few fallible entry points (configuration, logging).
//!
//! Observation itself never fails: redundant or invalid input to the runtime
//! is a silent no-op.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RippleError>;

#[derive(Debug, Error)]
pub enum RippleError {
    #[cfg(feature = "config")]
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("logging init failed: {message}")]
    LoggingInit { message: String },
}

impl RippleError {
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
