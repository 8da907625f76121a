//! Engine and service configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default fork-width limit
pub const DEFAULT_MAX_BRANCHES: usize = 3;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// storyfork configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkConfig {
    /// Maximum simultaneous alternatives per story
    pub max_branches: usize,
    /// Snapshots buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl ForkConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With fork-width limit
    #[inline]
    #[must_use]
    pub fn with_max_branches(mut self, max: usize) -> Self {
        self.max_branches = max;
        self
    }

    /// With subscriber buffer size
    #[inline]
    #[must_use]
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// With log filter directive
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys and
    /// `ConfigError::InvalidValue` for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Same as [`Self::from_toml_str`], plus `ConfigError::Io`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_branches < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_branches",
                reason: format!("must be at least 2, got {}", self.max_branches),
            });
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "broadcast_capacity",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            max_branches: DEFAULT_MAX_BRANCHES,
            broadcast_capacity: 64,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
