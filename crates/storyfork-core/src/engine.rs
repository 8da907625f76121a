//! Invariant engine
//!
//! Pure functions that decide whether a requested transition is legal for a
//! story tree and compute the tree it produces. Nothing here performs IO or
//! holds state; the same input always yields the same output.
//!
//! Every tree returned by [`apply`] satisfies [`TreeShape::is_legal`]: a
//! delete that would leave a single branch collapses the story back to its
//! unbranched state instead.

use crate::error::EngineError;
use crate::types::{Branch, BranchId, Content, StoryId, StoryTree};
use serde::{Deserialize, Serialize};

/// Longest accepted branch label, in characters
pub const MAX_LABEL_LEN: usize = 64;

/// Requested structural or content change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unbranched -> two branches
    Fork,
    /// Add one empty branch
    Extend,
    /// Remove a branch, collapsing when only one would remain
    Delete(BranchId),
    /// Relabel a branch
    Rename { branch: BranchId, label: String },
    /// Replace base or branch content wholesale
    ReplaceContent {
        target: ContentTarget,
        content: Content,
    },
}

impl Transition {
    /// Discriminant used in refusals and logs
    #[must_use]
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Fork => TransitionKind::Fork,
            Self::Extend => TransitionKind::Extend,
            Self::Delete(_) => TransitionKind::Delete,
            Self::Rename { .. } => TransitionKind::Rename,
            Self::ReplaceContent { .. } => TransitionKind::EditContent,
        }
    }
}

/// Transition discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Fork,
    Extend,
    Delete,
    Rename,
    EditContent,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fork => "fork",
            Self::Extend => "extend",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::EditContent => "edit content",
        };
        f.write_str(name)
    }
}

/// Which content a replacement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTarget {
    /// Story base content (editable only while unbranched)
    Base,
    /// One branch's content (editable only while branched)
    Branch(BranchId),
}

/// How a delete will be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteKind {
    /// Only the named branch goes away; at least two remain
    Simple,
    /// The story collapses; `survivor`'s content becomes the base
    Cascade { survivor: BranchId },
}

impl DeleteKind {
    /// Whether the delete removes more than the named branch
    #[inline]
    #[must_use]
    pub fn is_cascade(&self) -> bool {
        matches!(self, Self::Cascade { .. })
    }
}

/// Read-only preview of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub story_id: StoryId,
    pub branch_id: BranchId,
    pub kind: DeleteKind,
    /// Tree version the plan was computed against
    pub based_on_version: u64,
    /// Branches left after the delete commits
    pub remaining: usize,
}

impl DeletePlan {
    /// Whether the caller must confirm a cascade before committing
    #[inline]
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.kind.is_cascade()
    }

    /// Wording the editor shows before committing
    #[must_use]
    pub fn confirmation_message(&self) -> String {
        match self.kind {
            DeleteKind::Simple => format!("Delete branch {}?", self.branch_id),
            DeleteKind::Cascade { survivor } => format!(
                "Delete branch {}? Branch {} is also going to get deleted and its content \
                 will become the story content. The story will no longer be branched.",
                self.branch_id, survivor
            ),
        }
    }
}

/// What an accepted transition did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "effect")]
pub enum Effect {
    Forked { first: BranchId, second: BranchId },
    Extended { branch: BranchId },
    Deleted { branch: BranchId },
    Collapsed {
        deleted: BranchId,
        survivor: BranchId,
    },
    Renamed { branch: BranchId },
    ContentReplaced { target: ContentTarget },
}

/// Result of an accepted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub tree: StoryTree,
    pub effect: Effect,
}

/// Compute the delete plan for `branch` against the current tree
///
/// # Errors
/// - `InvalidTransition` if the story has fewer than two branches
/// - `BranchNotFound` if `branch` is not live
pub fn plan_delete(tree: &StoryTree, branch: BranchId) -> Result<DeletePlan, EngineError> {
    let shape = tree.shape();
    if shape.branch_count < 2 {
        return Err(EngineError::invalid(TransitionKind::Delete, shape));
    }
    if tree.branch(branch).is_none() {
        return Err(EngineError::BranchNotFound {
            story: tree.story_id,
            branch,
        });
    }

    let kind = if shape.branch_count == 2 {
        let survivor = tree
            .branches
            .iter()
            .map(|b| b.id)
            .find(|id| *id != branch)
            .ok_or(EngineError::BranchNotFound {
                story: tree.story_id,
                branch,
            })?;
        DeleteKind::Cascade { survivor }
    } else {
        DeleteKind::Simple
    };

    Ok(DeletePlan {
        story_id: tree.story_id,
        branch_id: branch,
        remaining: if kind.is_cascade() { 0 } else { shape.branch_count - 1 },
        kind,
        based_on_version: tree.version,
    })
}

/// Apply `transition` to `tree`, returning the next committed tree
///
/// The returned tree carries `version + 1`.
///
/// # Errors
/// Refuses with [`EngineError`] when the transition is illegal for the
/// current shape; `tree` is never modified.
pub fn apply(tree: &StoryTree, transition: &Transition) -> Result<Applied, EngineError> {
    let shape = tree.shape();
    let kind = transition.kind();
    let mut next = tree.clone();

    let effect = match transition {
        Transition::Fork => {
            if !shape.can_fork() {
                return Err(EngineError::invalid(kind, shape));
            }
            let first = mint(&mut next, tree.base.clone());
            let second = mint(&mut next, Content::empty());
            Effect::Forked { first, second }
        }
        Transition::Extend => {
            if !shape.can_extend() {
                return Err(EngineError::invalid(kind, shape));
            }
            let branch = mint(&mut next, Content::empty());
            Effect::Extended { branch }
        }
        Transition::Delete(branch) => {
            let plan = plan_delete(tree, *branch)?;
            match plan.kind {
                DeleteKind::Simple => {
                    next.branches.retain(|b| b.id != *branch);
                    Effect::Deleted { branch: *branch }
                }
                DeleteKind::Cascade { survivor } => {
                    let kept = next
                        .branches
                        .drain(..)
                        .find(|b| b.id == survivor)
                        .ok_or(EngineError::BranchNotFound {
                            story: tree.story_id,
                            branch: survivor,
                        })?;
                    next.base = kept.content;
                    Effect::Collapsed {
                        deleted: *branch,
                        survivor,
                    }
                }
            }
        }
        Transition::Rename { branch, label } => {
            let label = validate_label(label)?;
            let target = next
                .branches
                .iter_mut()
                .find(|b| b.id == *branch)
                .ok_or(EngineError::BranchNotFound {
                    story: tree.story_id,
                    branch: *branch,
                })?;
            target.label = label;
            Effect::Renamed { branch: *branch }
        }
        Transition::ReplaceContent { target, content } => {
            match target {
                ContentTarget::Base => {
                    // base is frozen while branched
                    if tree.is_branched() {
                        return Err(EngineError::invalid(kind, shape));
                    }
                    next.base = content.clone();
                }
                ContentTarget::Branch(branch) => {
                    if !tree.is_branched() {
                        return Err(EngineError::invalid(kind, shape));
                    }
                    let slot = next
                        .branches
                        .iter_mut()
                        .find(|b| b.id == *branch)
                        .ok_or(EngineError::BranchNotFound {
                            story: tree.story_id,
                            branch: *branch,
                        })?;
                    slot.content = content.clone();
                }
            }
            Effect::ContentReplaced { target: *target }
        }
    };

    next.version = tree.version + 1;
    debug_assert!(next.shape().is_legal(), "engine produced {}", next.shape());

    Ok(Applied { tree: next, effect })
}

/// Append a new branch with the next sequence number
fn mint(tree: &mut StoryTree, content: Content) -> BranchId {
    tree.branch_seq += 1;
    let id = BranchId(tree.branch_seq);
    tree.branches.push(Branch {
        id,
        story_id: tree.story_id,
        label: Branch::default_label(id),
        content,
        order: tree.branch_seq,
    });
    id
}

fn validate_label(label: &str) -> Result<String, EngineError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidLabel("label is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(EngineError::InvalidLabel(format!(
            "label longer than {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DialogueStep, ProjectId, StoryId};
    use pretty_assertions::assert_eq;

    fn story(base: Content) -> StoryTree {
        StoryTree::new(StoryId::new(), ProjectId::new(), "greet", base, 3)
    }

    fn base() -> Content {
        Content::from(vec![DialogueStep::user("hello"), DialogueStep::bot("utter_hello")])
    }

    fn forked() -> StoryTree {
        apply(&story(base()), &Transition::Fork).unwrap().tree
    }

    fn ids(tree: &StoryTree) -> Vec<BranchId> {
        tree.branches.iter().map(|b| b.id).collect()
    }

    #[test]
    fn fork_copies_base_into_first_branch() {
        let applied = apply(&story(base()), &Transition::Fork).unwrap();
        let tree = applied.tree;

        assert_eq!(tree.branch_count(), 2);
        assert_eq!(tree.branches[0].content, base());
        assert!(tree.branches[1].content.is_empty());
        assert_eq!(tree.version, 1);
        assert_eq!(
            applied.effect,
            Effect::Forked {
                first: BranchId(1),
                second: BranchId(2),
            }
        );
        assert_eq!(tree.branches[0].label, "Branch 1");
    }

    #[test]
    fn fork_refused_when_branched() {
        let err = apply(&forked(), &Transition::Fork).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { transition: TransitionKind::Fork, .. }
        ));
    }

    #[test]
    fn extend_appends_empty_branch() {
        let before = forked();
        let after = apply(&before, &Transition::Extend).unwrap().tree;

        assert_eq!(after.branch_count(), 3);
        assert_eq!(after.branches[..2], before.branches[..]);
        assert!(after.branches[2].content.is_empty());
        assert_eq!(after.branches[2].order, 3);
    }

    #[test]
    fn extend_refused_unbranched_and_at_limit() {
        let err = apply(&story(base()), &Transition::Extend).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let full = apply(&forked(), &Transition::Extend).unwrap().tree;
        assert!(!full.shape().can_extend());
        assert!(!full.shape().can_fork());
        let err = apply(&full, &Transition::Extend).unwrap_err();
        assert_eq!(
            err,
            EngineError::invalid(TransitionKind::Extend, crate::types::TreeShape::new(3, 3))
        );
    }

    #[test]
    fn simple_delete_keeps_siblings() {
        let full = apply(&forked(), &Transition::Extend).unwrap().tree;
        let plan = plan_delete(&full, BranchId(2)).unwrap();
        assert_eq!(plan.kind, DeleteKind::Simple);
        assert_eq!(plan.remaining, 2);
        assert!(!plan.requires_confirmation());

        let after = apply(&full, &Transition::Delete(BranchId(2))).unwrap().tree;
        assert_eq!(ids(&after), vec![BranchId(1), BranchId(3)]);
        assert_eq!(after.branches[0], full.branches[0]);
        assert_eq!(after.branches[1], full.branches[2]);
    }

    #[test]
    fn delete_of_two_collapses_into_base() {
        let mut tree = forked();
        let xxx = Content::from(vec![DialogueStep::user("xxx")]);
        tree = apply(
            &tree,
            &Transition::ReplaceContent {
                target: ContentTarget::Branch(BranchId(2)),
                content: xxx.clone(),
            },
        )
        .unwrap()
        .tree;

        let plan = plan_delete(&tree, BranchId(1)).unwrap();
        assert_eq!(
            plan.kind,
            DeleteKind::Cascade {
                survivor: BranchId(2),
            }
        );
        assert!(plan.requires_confirmation());
        assert!(plan.confirmation_message().contains("is also going to get deleted"));

        let applied = apply(&tree, &Transition::Delete(BranchId(1))).unwrap();
        assert_eq!(applied.tree.branch_count(), 0);
        assert_eq!(applied.tree.base, xxx);
        assert_eq!(
            applied.effect,
            Effect::Collapsed {
                deleted: BranchId(1),
                survivor: BranchId(2),
            }
        );
    }

    #[test]
    fn delete_refused_when_unbranched() {
        let err = apply(&story(base()), &Transition::Delete(BranchId(1))).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { transition: TransitionKind::Delete, .. }
        ));
    }

    #[test]
    fn delete_unknown_branch() {
        let err = plan_delete(&forked(), BranchId(9)).unwrap_err();
        assert!(matches!(err, EngineError::BranchNotFound { branch: BranchId(9), .. }));
    }

    #[test]
    fn ids_not_reused_after_collapse() {
        let collapsed = apply(&forked(), &Transition::Delete(BranchId(2))).unwrap().tree;
        let refork = apply(&collapsed, &Transition::Fork).unwrap().tree;
        assert_eq!(ids(&refork), vec![BranchId(3), BranchId(4)]);
        assert_eq!(refork.branches[0].content, base());
    }

    #[test]
    fn base_frozen_while_branched() {
        let err = apply(
            &forked(),
            &Transition::ReplaceContent {
                target: ContentTarget::Base,
                content: Content::empty(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let err = apply(
            &story(base()),
            &Transition::ReplaceContent {
                target: ContentTarget::Branch(BranchId(1)),
                content: Content::empty(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn rename_trims_and_validates() {
        let tree = apply(
            &forked(),
            &Transition::Rename {
                branch: BranchId(1),
                label: "  happy path ".to_string(),
            },
        )
        .unwrap()
        .tree;
        assert_eq!(tree.branches[0].label, "happy path");

        let err = apply(
            &tree,
            &Transition::Rename {
                branch: BranchId(1),
                label: "   ".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLabel(_)));

        let long = "x".repeat(MAX_LABEL_LEN + 1);
        let rename = Transition::Rename {
            branch: BranchId(1),
            label: long,
        };
        assert!(apply(&tree, &rename).is_err());
    }

    #[test]
    fn refusal_leaves_input_untouched() {
        let tree = forked();
        let copy = tree.clone();
        let _ = apply(&tree, &Transition::Fork);
        assert_eq!(tree, copy);
    }
}
