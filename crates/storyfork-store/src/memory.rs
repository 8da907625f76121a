//! In-memory tree store

use crate::{StoreError, TreeStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use storyfork_core::{ProjectId, StoryId, StoryTree};

/// Committed trees keyed by story
///
/// Each entry is swapped under the shard lock, so concurrent readers of the
/// same story always clone a complete `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: DashMap<StoryId, Arc<StoryTree>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: DashMap::new(),
        }
    }

    /// Synchronous read of the committed tree
    #[must_use]
    pub fn snapshot(&self, story: StoryId) -> Option<Arc<StoryTree>> {
        self.trees.get(&story).map(|t| Arc::clone(t.value()))
    }

    /// Number of stories held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Whether no stories are held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn load(&self, story: StoryId) -> Result<Option<Arc<StoryTree>>, StoreError> {
        Ok(self.snapshot(story))
    }

    async fn insert(&self, tree: StoryTree) -> Result<Arc<StoryTree>, StoreError> {
        match self.trees.entry(tree.story_id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(tree.story_id)),
            Entry::Vacant(slot) => {
                let tree = Arc::new(tree);
                slot.insert(Arc::clone(&tree));
                Ok(tree)
            }
        }
    }

    async fn commit(&self, tree: StoryTree) -> Result<Arc<StoryTree>, StoreError> {
        let story = tree.story_id;
        let mut current = self.trees.get_mut(&story).ok_or(StoreError::NotFound(story))?;

        let stored = current.version;
        if tree.version != stored + 1 {
            return Err(StoreError::VersionConflict {
                story,
                stored,
                attempted: tree.version,
            });
        }

        let tree = Arc::new(tree);
        *current = Arc::clone(&tree);
        tracing::trace!(%story, version = tree.version, "tree committed");
        Ok(tree)
    }

    async fn stories_in(&self, project: ProjectId) -> Result<Vec<StoryId>, StoreError> {
        let mut ids: Vec<StoryId> = self
            .trees
            .iter()
            .filter(|t| t.project_id == project)
            .map(|t| *t.key())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
