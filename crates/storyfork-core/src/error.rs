//! Error types for the invariant engine and configuration

use crate::engine::TransitionKind;
use crate::types::{BranchId, StoryId, TreeShape};
use std::path::PathBuf;

/// Refusals produced by the invariant engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Transition is illegal for the current shape
    #[error("{transition} is not allowed with {shape}")]
    InvalidTransition {
        /// Requested transition
        transition: TransitionKind,
        /// Shape the request was evaluated against
        shape: TreeShape,
    },

    /// Branch is not live in the story
    #[error("branch {branch} not found in story {story}")]
    BranchNotFound {
        /// Story searched
        story: StoryId,
        /// Missing branch
        branch: BranchId,
    },

    /// Branch label rejected
    #[error("invalid branch label: {0}")]
    InvalidLabel(String),
}

impl EngineError {
    /// Create invalid transition error
    #[inline]
    #[must_use]
    pub fn invalid(transition: TransitionKind, shape: TreeShape) -> Self {
        Self::InvalidTransition { transition, shape }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading a config file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse into a config
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}
