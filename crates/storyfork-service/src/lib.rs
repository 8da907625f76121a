//! storyfork Service
//!
//! Serializes branch-tree mutations per story and fans committed trees out to
//! viewers.
//!
//! - Checks the access guard and story existence before queueing
//! - Runs at most one mutation per story at a time, in arrival order
//! - Re-validates every request against the live tree
//! - Publishes the full committed tree after each commit
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storyfork_core::{ActorId, Content, ForkConfig, ProjectId};
//! use storyfork_service::{init, AllowAll, MutationService};
//! use storyfork_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ForkConfig::new();
//! init(&config)?;
//! let service = MutationService::new(config, Arc::new(MemoryStore::new()), Arc::new(AllowAll));
//!
//! let actor = ActorId::new();
//! let story = service.create_story(actor, ProjectId::new(), "greet", Content::empty()).await?;
//! let forked = service.fork(story.story_id, actor).await?;
//! assert_eq!(forked.view().branch_count, 2);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod broadcast;
pub mod error;
pub mod guard;
pub mod init;
pub mod service;
pub mod slots;

// Re-exports for convenience
pub use broadcast::{BroadcastStats, Broadcaster, ChannelBroadcaster, Subscription};
pub use error::{GuardError, MutationError};
pub use guard::{AccessGuard, AllowAll, Capability, StaticGuard};
pub use init::init;
pub use service::{Committed, MutationService};
pub use slots::{SlotTable, StorySlot};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the mutation service
    pub use crate::{
        AccessGuard, Broadcaster, Committed, MutationError, MutationService, Subscription,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
