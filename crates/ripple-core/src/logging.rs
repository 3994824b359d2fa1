#![forbid(unsafe_code)]

//! JSON log output for production deployments.
//!
//! Runtime internals emit `tracing` events under their module paths
//! (`ripple_runtime::reactive::batch`, ...). This helper installs a global
//! JSON subscriber filtered by `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

use crate::error::{Result, RippleError};

/// Install a global JSON `tracing` subscriber.
///
/// # Errors
///
/// Returns [`RippleError::LoggingInit`] if a global subscriber is already set.
pub fn init_json() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| RippleError::LoggingInit {
            message: err.to_string(),
        })
}
