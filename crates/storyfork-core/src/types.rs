//! Core types for storyfork
//!
//! Defines the fundamental records the engine works on:
//! - Identifiers for stories, projects, actors and branches
//! - Dialogue content
//! - Story trees and their branches

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique story identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoryId(pub Ulid);

impl StoryId {
    /// Generate new story ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for StoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique project identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Ulid);

impl ProjectId {
    /// Generate new project ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a collaborator issuing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Ulid);

impl ActorId {
    /// Generate new actor ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Branch identifier, scoped to its story
///
/// Minted from the story's branch sequence. Numbers are never reused, so an
/// identifier stays valid for as long as the branch lives and never aliases a
/// later branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchId(pub u32);

impl BranchId {
    /// Sequence number the branch was minted with
    #[inline]
    #[must_use]
    pub fn seq(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Who speaks a dialogue step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// End user utterance / intent
    User,
    /// Bot response / action
    Bot,
}

/// One line of a story
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueStep {
    pub speaker: Speaker,
    pub text: String,
}

impl DialogueStep {
    /// User step
    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    /// Bot step
    #[inline]
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Bot,
            text: text.into(),
        }
    }
}

/// Ordered dialogue steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Content(Vec<DialogueStep>);

impl Content {
    /// Empty content
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Content from steps
    #[inline]
    #[must_use]
    pub fn from_steps(steps: Vec<DialogueStep>) -> Self {
        Self(steps)
    }

    /// Steps in order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[DialogueStep] {
        &self.0
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<DialogueStep>> for Content {
    fn from(steps: Vec<DialogueStep>) -> Self {
        Self(steps)
    }
}

impl FromIterator<DialogueStep> for Content {
    fn from_iter<I: IntoIterator<Item = DialogueStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One live alternative of a forked story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub story_id: StoryId,
    pub label: String,
    pub content: Content,
    /// Creation order, used for stable display ordering
    pub order: u32,
}

impl Branch {
    /// Default label for a freshly minted branch
    #[inline]
    #[must_use]
    pub fn default_label(id: BranchId) -> String {
        format!("Branch {}", id.seq())
    }
}

/// A story and its branch set, as committed
///
/// Trees are immutable values: the engine returns a new tree for every
/// accepted transition and the store swaps it in whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryTree {
    pub story_id: StoryId,
    pub project_id: ProjectId,
    pub title: String,
    /// Content used while unbranched; frozen while branched
    pub base: Content,
    /// Live branches, sorted by creation order
    pub branches: Vec<Branch>,
    /// Fork-width limit
    pub max_branches: usize,
    /// Commit counter, bumped once per committed mutation
    pub version: u64,
    /// Last branch sequence number handed out
    pub branch_seq: u32,
}

impl StoryTree {
    /// Create an unbranched story
    #[must_use]
    pub fn new(
        story_id: StoryId,
        project_id: ProjectId,
        title: impl Into<String>,
        base: Content,
        max_branches: usize,
    ) -> Self {
        Self {
            story_id,
            project_id,
            title: title.into(),
            base,
            branches: Vec::new(),
            max_branches,
            version: 0,
            branch_seq: 0,
        }
    }

    /// Number of live branches
    #[inline]
    #[must_use]
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Whether the story currently has alternatives
    #[inline]
    #[must_use]
    pub fn is_branched(&self) -> bool {
        !self.branches.is_empty()
    }

    /// Lookup a live branch
    #[must_use]
    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }

    /// Structural summary of this tree
    #[inline]
    #[must_use]
    pub fn shape(&self) -> TreeShape {
        TreeShape::new(self.branch_count(), self.max_branches)
    }
}

/// Branch count and width limit; all the engine needs to decide legality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeShape {
    pub branch_count: usize,
    pub max_branches: usize,
}

impl TreeShape {
    #[inline]
    #[must_use]
    pub const fn new(branch_count: usize, max_branches: usize) -> Self {
        Self {
            branch_count,
            max_branches,
        }
    }

    /// A fork is possible only from the unbranched state
    #[inline]
    #[must_use]
    pub fn can_fork(&self) -> bool {
        self.branch_count == 0
    }

    /// Another alternative fits under the width limit
    #[inline]
    #[must_use]
    pub fn can_extend(&self) -> bool {
        self.branch_count > 0 && self.branch_count < self.max_branches
    }

    /// The "create branch" affordance is enabled
    #[inline]
    #[must_use]
    pub fn can_create(&self) -> bool {
        self.can_fork() || self.can_extend()
    }

    /// Count is 0 or within `[2, max_branches]`
    #[inline]
    #[must_use]
    pub fn is_legal(&self) -> bool {
        self.branch_count == 0 || (2..=self.max_branches).contains(&self.branch_count)
    }
}

impl std::fmt::Display for TreeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} branches", self.branch_count, self.max_branches)
    }
}
