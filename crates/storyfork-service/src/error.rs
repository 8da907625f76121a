//! Error types for the mutation service
//!
//! Every error is a rejected request: nothing was committed and nothing was
//! published. None of them are retried inside the service.

use storyfork_core::{
    ActorId, BranchId, DeleteKind, DeletePlan, EngineError, StoryId, TransitionKind, TreeShape,
};
use storyfork_store::StoreError;

/// Refusal returned by every mutation service operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// Story does not exist
    #[error("story not found: {0}")]
    StoryNotFound(StoryId),

    /// Branch is not live in the story
    #[error("branch {branch} not found in story {story}")]
    BranchNotFound { story: StoryId, branch: BranchId },

    /// Access guard refused or could not be reached
    #[error("actor {actor} may not {capability} story {story}")]
    PermissionDenied {
        actor: ActorId,
        story: StoryId,
        capability: &'static str,
    },

    /// Transition is illegal for the current shape
    #[error("{transition} is not allowed with {shape}")]
    InvalidTransition {
        transition: TransitionKind,
        /// Live shape, so the caller can recompute affordances
        shape: TreeShape,
    },

    /// Request payload rejected (e.g. an empty label)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Delete would cascade and was not confirmed
    #[error("deleting {} collapses the story and must be confirmed", .plan.branch_id)]
    ConfirmationRequired {
        /// Freshly computed plan to present to the actor
        plan: DeletePlan,
    },

    /// Shape changed since the plan the caller confirmed
    #[error("story {story} changed: planned {expected:?} delete, now {actual:?}")]
    ConcurrentModification {
        story: StoryId,
        expected: DeleteKind,
        actual: DeleteKind,
    },

    /// Store backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MutationError {
    /// Referenced story or branch does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoryNotFound(_) | Self::BranchNotFound { .. })
    }

    /// Caller should prompt the actor again rather than give up
    #[inline]
    #[must_use]
    pub fn requires_reprompt(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired { .. } | Self::ConcurrentModification { .. }
        )
    }

    /// Reissuing the identical request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StoreError::Backend(_) | StoreError::VersionConflict { .. })
        )
    }

    /// Live shape carried by the refusal, if any
    #[inline]
    #[must_use]
    pub fn shape(&self) -> Option<TreeShape> {
        match self {
            Self::InvalidTransition { shape, .. } => Some(*shape),
            _ => None,
        }
    }
}

impl From<EngineError> for MutationError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidTransition { transition, shape } => {
                Self::InvalidTransition { transition, shape }
            }
            EngineError::BranchNotFound { story, branch } => Self::BranchNotFound { story, branch },
            EngineError::InvalidLabel(reason) => Self::InvalidInput(reason),
        }
    }
}

/// Access guard could not answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// Guard backend unreachable
    #[error("access guard unavailable: {0}")]
    Unavailable(String),
}
