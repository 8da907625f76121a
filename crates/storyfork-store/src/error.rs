//! Store errors

use storyfork_core::StoryId;

/// Errors from a [`crate::TreeStore`] backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Story was never inserted
    #[error("story not found: {0}")]
    NotFound(StoryId),

    /// Story id already registered
    #[error("story already exists: {0}")]
    AlreadyExists(StoryId),

    /// Commit was not based on the stored version
    #[error("version conflict on {story}: stored {stored}, attempted {attempted}")]
    VersionConflict {
        story: StoryId,
        stored: u64,
        attempted: u64,
    },

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}
