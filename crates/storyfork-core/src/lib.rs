//! storyfork Core
//!
//! Types and the pure invariant engine for branching conversational stories.
//!
//! # Core Concepts
//!
//! - [`StoryTree`]: a story, its base content and its live branches
//! - [`engine::apply`]: validates a [`Transition`] and computes the next tree
//! - [`engine::plan_delete`]: previews whether a delete is simple or cascades
//! - [`TreeView`]: what an editor renders for a story
//!
//! A story has either no branches or between two and `max_branches`. Deleting
//! one of the last two branches collapses the story: the other branch's content
//! becomes the base and both records go away.
//!
//! # Example
//!
//! ```rust
//! use storyfork_core::{apply, Content, ProjectId, StoryId, StoryTree, Transition};
//!
//! let tree = StoryTree::new(StoryId::new(), ProjectId::new(), "greet", Content::empty(), 3);
//! let forked = apply(&tree, &Transition::Fork).unwrap().tree;
//! assert_eq!(forked.branch_count(), 2);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod types;
pub mod view;

// Re-exports
pub use config::{ForkConfig, LogFormat, DEFAULT_MAX_BRANCHES};
pub use engine::{
    apply, plan_delete, Applied, ContentTarget, DeleteKind, DeletePlan, Effect, Transition,
    TransitionKind,
};
pub use error::{ConfigError, EngineError};
pub use types::{
    ActorId, Branch, BranchId, Content, DialogueStep, ProjectId, Speaker, StoryId, StoryTree,
    TreeShape,
};
pub use view::{BranchSummary, TreeView};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with story trees
    pub use crate::{
        apply, plan_delete, ActorId, BranchId, Content, ContentTarget, DeleteKind, DeletePlan,
        DialogueStep, EngineError, ForkConfig, ProjectId, StoryId, StoryTree, Transition,
        TreeView,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
