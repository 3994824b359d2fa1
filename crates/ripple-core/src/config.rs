#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! With the `config` feature enabled, a [`RuntimeConfig`] can be loaded from
//! TOML; every field is optional and falls back to its default:
//!
//! ```toml
//! reserved_prefixes = ["$", "_"]
//! emit_length_events = true
//! flush_warn_threshold = 10000
//! ```

use crate::error::{Result, RippleError};
use crate::path::DEFAULT_RESERVED_PREFIXES;

/// Default number of jobs a single flush may run before a warning is logged.
pub const DEFAULT_FLUSH_WARN_THRESHOLD: usize = 10_000;

/// Tunables shared by the graph and the batch scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct RuntimeConfig {
    /// Keys starting with one of these characters are never tracked.
    pub reserved_prefixes: Vec<char>,
    /// Emit `<key>.length` set events alongside array writes and mutations.
    pub emit_length_events: bool,
    /// A flush running more jobs than this logs a warning.
    pub flush_warn_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reserved_prefixes: DEFAULT_RESERVED_PREFIXES.to_vec(),
            emit_length_events: true,
            flush_warn_threshold: DEFAULT_FLUSH_WARN_THRESHOLD,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_reserved_prefixes(mut self, prefixes: impl IntoIterator<Item = char>) -> Self {
        self.reserved_prefixes = prefixes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_length_events(mut self, enabled: bool) -> Self {
        self.emit_length_events = enabled;
        self
    }

    #[must_use]
    pub fn with_flush_warn_threshold(mut self, threshold: usize) -> Self {
        self.flush_warn_threshold = threshold;
        self
    }

    /// Check field values that cannot be expressed in the type.
    ///
    /// # Errors
    ///
    /// Returns [`RippleError::InvalidConfig`] when `.` is a reserved prefix
    /// (it is the path separator) or the flush threshold is zero.
    pub fn validate(&self) -> Result<()> {
        if self.reserved_prefixes.contains(&'.') {
            return Err(RippleError::invalid_config(
                "'.' separates path segments and cannot be a reserved prefix",
            ));
        }
        if self.flush_warn_threshold == 0 {
            return Err(RippleError::invalid_config(
                "flush_warn_threshold must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RippleError::ConfigParse`] for malformed TOML or unknown
    /// fields, and [`RippleError::InvalidConfig`] when validation fails.
    #[cfg(feature = "config")]
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }
}
