//! Read-side projections of a committed tree
//!
//! [`TreeView`] is what the editor renders: counts, labels, order and the
//! create-branch affordances. It never carries content.

use crate::types::{BranchId, StoryId, StoryTree};
use serde::{Deserialize, Serialize};

/// Label and ordering of one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub id: BranchId,
    pub label: String,
    pub order: u32,
}

/// Editor-facing view of a story's branch set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeView {
    pub story_id: StoryId,
    pub version: u64,
    pub branch_count: usize,
    pub branches: Vec<BranchSummary>,
    pub can_fork: bool,
    pub can_extend: bool,
}

impl TreeView {
    /// Project a committed tree
    #[must_use]
    pub fn of(tree: &StoryTree) -> Self {
        let shape = tree.shape();
        let mut branches: Vec<BranchSummary> = tree
            .branches
            .iter()
            .map(|b| BranchSummary {
                id: b.id,
                label: b.label.clone(),
                order: b.order,
            })
            .collect();
        branches.sort_by_key(|b| b.order);

        Self {
            story_id: tree.story_id,
            version: tree.version,
            branch_count: shape.branch_count,
            branches,
            can_fork: shape.can_fork(),
            can_extend: shape.can_extend(),
        }
    }

    /// Whether the create-branch control is enabled
    #[inline]
    #[must_use]
    pub fn can_create(&self) -> bool {
        self.can_fork || self.can_extend
    }
}

impl From<&StoryTree> for TreeView {
    fn from(tree: &StoryTree) -> Self {
        Self::of(tree)
    }
}
