//! storyfork Store
//!
//! Holds the committed [`StoryTree`] of every story.
//!
//! # Overview
//!
//! - [`TreeStore`]: storage seam used by the mutation service
//! - [`MemoryStore`]: in-process implementation over `DashMap`
//!
//! Trees are stored as `Arc<StoryTree>` and replaced whole on commit, so a
//! reader either sees the previous tree or the next one, never a mix.
//! Commits are version-checked: a tree is accepted only if it is exactly one
//! version ahead of the stored one.

#![warn(missing_docs)]

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::sync::Arc;
use storyfork_core::{ProjectId, StoryId, StoryTree};

/// Storage backend for committed story trees
#[async_trait]
pub trait TreeStore: Send + Sync + std::fmt::Debug {
    /// Last committed tree for a story
    ///
    /// # Errors
    /// Backend failures only; a missing story is `Ok(None)`.
    async fn load(&self, story: StoryId) -> Result<Option<Arc<StoryTree>>, StoreError>;

    /// Register a new story at version 0
    ///
    /// # Errors
    /// `StoreError::AlreadyExists` if the id is taken.
    async fn insert(&self, tree: StoryTree) -> Result<Arc<StoryTree>, StoreError>;

    /// Replace the committed tree
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the story was never inserted
    /// - `StoreError::VersionConflict` unless `tree.version` is the stored
    ///   version plus one
    async fn commit(&self, tree: StoryTree) -> Result<Arc<StoryTree>, StoreError>;

    /// Stories belonging to a project
    ///
    /// # Errors
    /// Backend failures.
    async fn stories_in(&self, project: ProjectId) -> Result<Vec<StoryId>, StoreError>;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
