//! Mutation service
//!
//! The only writer of story trees. Every mutation follows the same path:
//!
//! 1. Load the committed tree (`StoryNotFound` otherwise)
//! 2. Ask the access guard (`PermissionDenied` otherwise)
//! 3. Take the story's write slot
//! 4. Re-read the tree and run the invariant engine against it
//! 5. Commit to the store
//! 6. Publish the new tree while still holding the slot
//!
//! Steps 1 and 2 happen before the slot so rejected callers never queue
//! behind writers. Any refusal in steps 4 and 5 leaves the store untouched and
//! publishes nothing.

use crate::broadcast::{Broadcaster, ChannelBroadcaster, Subscription};
use crate::error::MutationError;
use crate::guard::{AccessGuard, Capability};
use crate::slots::SlotTable;
use std::sync::Arc;
use storyfork_core::{
    apply, plan_delete, ActorId, Applied, BranchId, Content, ContentTarget, DeletePlan, Effect,
    ForkConfig, ProjectId, StoryId, StoryTree, Transition, TreeView,
};
use storyfork_store::TreeStore;

/// Outcome of an accepted mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Tree as committed
    pub tree: Arc<StoryTree>,
    /// What the transition did
    pub effect: Effect,
}

impl Committed {
    /// Editor-facing view of the committed tree
    #[inline]
    #[must_use]
    pub fn view(&self) -> TreeView {
        TreeView::of(&self.tree)
    }
}

/// Per-story serialized mutation service
#[derive(Debug)]
pub struct MutationService {
    config: ForkConfig,
    store: Arc<dyn TreeStore>,
    guard: Arc<dyn AccessGuard>,
    hub: Arc<ChannelBroadcaster>,
    sinks: Vec<Arc<dyn Broadcaster>>,
    slots: SlotTable,
}

impl MutationService {
    /// Create service over a store and an access guard
    #[must_use]
    pub fn new(config: ForkConfig, store: Arc<dyn TreeStore>, guard: Arc<dyn AccessGuard>) -> Self {
        let hub = Arc::new(ChannelBroadcaster::new(config.broadcast_capacity));
        Self {
            config,
            store,
            guard,
            sinks: vec![Arc::clone(&hub) as Arc<dyn Broadcaster>],
            hub,
            slots: SlotTable::new(),
        }
    }

    /// Also publish commits to an external broadcaster
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.sinks.push(broadcaster);
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ForkConfig {
        &self.config
    }

    /// Built-in subscription hub
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &ChannelBroadcaster {
        &self.hub
    }

    /// Per-story write slots
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// Register a new unbranched story
    ///
    /// # Errors
    /// - `PermissionDenied` without `EditStory` on `project`
    /// - `Storage` if the store rejects the insert
    pub async fn create_story(
        &self,
        actor: ActorId,
        project: ProjectId,
        title: impl Into<String>,
        base: Content,
    ) -> Result<Arc<StoryTree>, MutationError> {
        let story = StoryId::new();
        if !self.guard.can_edit(actor, project).await {
            return Err(MutationError::PermissionDenied {
                actor,
                story,
                capability: Capability::EditStory.verb(),
            });
        }

        let tree = StoryTree::new(story, project, title, base, self.config.max_branches);
        let tree = self.store.insert(tree).await?;
        tracing::info!(%story, %project, %actor, "story created");
        Ok(tree)
    }

    /// Last committed tree
    ///
    /// # Errors
    /// `StoryNotFound`, or `Storage` on backend failure.
    pub async fn snapshot(&self, story: StoryId) -> Result<Arc<StoryTree>, MutationError> {
        self.store
            .load(story)
            .await?
            .ok_or(MutationError::StoryNotFound(story))
    }

    /// Last committed view
    ///
    /// # Errors
    /// Same as [`Self::snapshot`].
    pub async fn view(&self, story: StoryId) -> Result<TreeView, MutationError> {
        let tree = self.snapshot(story).await?;
        Ok(TreeView::of(&tree))
    }

    /// Follow a story's commits
    ///
    /// The subscription starts at the tree committed when it was opened.
    ///
    /// # Errors
    /// `StoryNotFound`, or `PermissionDenied` without `ReadStory`.
    pub async fn subscribe(
        &self,
        story: StoryId,
        actor: ActorId,
    ) -> Result<Subscription, MutationError> {
        let tree = self.snapshot(story).await?;
        self.authorize(actor, &tree, Capability::ReadStory).await?;

        // subscribe before the read so no commit falls between them
        let rx = self.hub.receiver(story);
        let tree = self.snapshot(story).await?;
        Ok(Subscription::new(tree, rx))
    }

    /// Split an unbranched story into two branches
    ///
    /// # Errors
    /// `StoryNotFound`, `PermissionDenied`, or `InvalidTransition` if the
    /// story is already branched.
    pub async fn fork(&self, story: StoryId, actor: ActorId) -> Result<Committed, MutationError> {
        self.mutate(story, actor, |tree| Ok(apply(tree, &Transition::Fork)?))
            .await
    }

    /// Add one empty branch
    ///
    /// # Errors
    /// `StoryNotFound`, `PermissionDenied`, or `InvalidTransition` if the
    /// story is unbranched or already at its fork-width limit.
    pub async fn extend(&self, story: StoryId, actor: ActorId) -> Result<Committed, MutationError> {
        self.mutate(story, actor, |tree| Ok(apply(tree, &Transition::Extend)?))
            .await
    }

    /// Preview a delete without taking the write slot
    ///
    /// The plan reflects the last committed tree and may be stale by the time
    /// it is committed.
    ///
    /// # Errors
    /// `StoryNotFound`, `BranchNotFound`, or `InvalidTransition` when the
    /// story has fewer than two branches.
    pub async fn plan_delete(
        &self,
        story: StoryId,
        branch: BranchId,
    ) -> Result<DeletePlan, MutationError> {
        let tree = self.snapshot(story).await?;
        let plan = plan_delete(&tree, branch)?;
        tracing::debug!(
            %story,
            %branch,
            kind = ?plan.kind,
            version = plan.based_on_version,
            "delete planned"
        );
        Ok(plan)
    }

    /// Delete a branch, re-planned against the live tree
    ///
    /// A delete that would cascade needs `confirmed`; a simple delete ignores
    /// it.
    ///
    /// # Errors
    /// `StoryNotFound`, `BranchNotFound`, `PermissionDenied`,
    /// `InvalidTransition`, or `ConfirmationRequired` for an unconfirmed
    /// cascade.
    pub async fn commit_delete(
        &self,
        story: StoryId,
        actor: ActorId,
        branch: BranchId,
        confirmed: bool,
    ) -> Result<Committed, MutationError> {
        self.mutate(story, actor, |tree| {
            let live = plan_delete(tree, branch)?;
            if live.requires_confirmation() && !confirmed {
                return Err(MutationError::ConfirmationRequired { plan: live });
            }
            Ok(apply(tree, &Transition::Delete(branch))?)
        })
        .await
    }

    /// Commit a delete previously returned by [`Self::plan_delete`]
    ///
    /// Re-plans against the live tree. The actor confirmed what the plan
    /// described, so the live plan must match it exactly: same kind and, for
    /// a cascade, the same survivor. Anything else is refused so the actor can
    /// be asked again with the current warning.
    ///
    /// # Errors
    /// As [`Self::commit_delete`], plus `ConcurrentModification` when the live
    /// delete no longer matches the plan.
    pub async fn commit_planned_delete(
        &self,
        actor: ActorId,
        plan: &DeletePlan,
        confirmed: bool,
    ) -> Result<Committed, MutationError> {
        let expected = plan.kind;
        let branch = plan.branch_id;
        self.mutate(plan.story_id, actor, |tree| {
            let live = plan_delete(tree, branch)?;
            if live.kind != expected {
                return Err(MutationError::ConcurrentModification {
                    story: tree.story_id,
                    expected,
                    actual: live.kind,
                });
            }
            if live.requires_confirmation() && !confirmed {
                return Err(MutationError::ConfirmationRequired { plan: live });
            }
            Ok(apply(tree, &Transition::Delete(branch))?)
        })
        .await
    }

    /// Relabel a branch
    ///
    /// # Errors
    /// `StoryNotFound`, `BranchNotFound`, `PermissionDenied`, or
    /// `InvalidInput` for an empty or overlong label.
    pub async fn rename_branch(
        &self,
        story: StoryId,
        actor: ActorId,
        branch: BranchId,
        label: impl Into<String>,
    ) -> Result<Committed, MutationError> {
        let transition = Transition::Rename {
            branch,
            label: label.into(),
        };
        self.mutate(story, actor, |tree| Ok(apply(tree, &transition)?))
            .await
    }

    /// Replace base or branch content
    ///
    /// # Errors
    /// `InvalidTransition` when editing the base of a branched story or a
    /// branch of an unbranched one; otherwise as [`Self::rename_branch`].
    pub async fn edit_content(
        &self,
        story: StoryId,
        actor: ActorId,
        target: ContentTarget,
        content: Content,
    ) -> Result<Committed, MutationError> {
        let transition = Transition::ReplaceContent { target, content };
        self.mutate(story, actor, |tree| Ok(apply(tree, &transition)?))
            .await
    }

    async fn authorize(
        &self,
        actor: ActorId,
        tree: &StoryTree,
        capability: Capability,
    ) -> Result<(), MutationError> {
        if self.guard.allows(actor, tree.project_id, capability).await {
            Ok(())
        } else {
            tracing::warn!(story = %tree.story_id, %actor, ?capability, "permission denied");
            Err(MutationError::PermissionDenied {
                actor,
                story: tree.story_id,
                capability: capability.verb(),
            })
        }
    }

    async fn mutate<F>(
        &self,
        story: StoryId,
        actor: ActorId,
        transform: F,
    ) -> Result<Committed, MutationError>
    where
        F: FnOnce(&StoryTree) -> Result<Applied, MutationError>,
    {
        let tree = self.snapshot(story).await?;
        self.authorize(actor, &tree, Capability::EditStory).await?;

        self.mutate_exclusive(story, actor, transform).await
    }

    async fn mutate_exclusive<F>(
        &self,
        story: StoryId,
        actor: ActorId,
        transform: F,
    ) -> Result<Committed, MutationError>
    where
        F: FnOnce(&StoryTree) -> Result<Applied, MutationError>,
    {
        let _slot = self.slots.acquire(story).await;
        tracing::debug!(%story, %actor, "write slot acquired");

        // the pre-slot read may be stale; decide against what is committed now
        let live = self.snapshot(story).await?;
        let applied = transform(&live).map_err(|e| {
            tracing::debug!(%story, %actor, version = live.version, "mutation refused: {}", e);
            e
        })?;

        let tree = self.store.commit(applied.tree).await?;
        for sink in &self.sinks {
            sink.publish(story, Arc::clone(&tree));
        }

        tracing::info!(
            %story,
            %actor,
            version = tree.version,
            branches = tree.branch_count(),
            effect = ?applied.effect,
            "mutation committed"
        );

        Ok(Committed {
            tree,
            effect: applied.effect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{AllowAll, StaticGuard};
    use parking_lot::Mutex;
    use storyfork_core::DialogueStep;
    use storyfork_store::MemoryStore;

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Mutex<Vec<(StoryId, u64)>>,
    }

    impl Broadcaster for Recorder {
        fn publish(&self, story: StoryId, snapshot: Arc<StoryTree>) {
            self.seen.lock().push((story, snapshot.version));
        }
    }

    fn service() -> MutationService {
        MutationService::new(
            ForkConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(AllowAll),
        )
    }

    fn base() -> Content {
        Content::from(vec![DialogueStep::user("hello")])
    }

    #[tokio::test]
    async fn fork_then_extend() {
        let svc = service();
        let actor = ActorId::new();
        let story = svc
            .create_story(actor, ProjectId::new(), "greet", base())
            .await
            .unwrap()
            .story_id;

        let forked = svc.fork(story, actor).await.unwrap();
        assert_eq!(forked.tree.branch_count(), 2);
        assert_eq!(forked.tree.branches[0].content, base());

        let extended = svc.extend(story, actor).await.unwrap();
        assert_eq!(extended.view().branch_count, 3);
        assert!(!extended.view().can_create());
    }

    #[tokio::test]
    async fn refusals_publish_nothing() {
        let recorder = Arc::new(Recorder::default());
        let svc = service().with_broadcaster(recorder.clone());
        let actor = ActorId::new();
        let story = svc
            .create_story(actor, ProjectId::new(), "greet", base())
            .await
            .unwrap()
            .story_id;

        assert!(svc.extend(story, actor).await.is_err());
        svc.fork(story, actor).await.unwrap();
        assert!(svc.fork(story, actor).await.is_err());

        assert_eq!(*recorder.seen.lock(), vec![(story, 1)]);
    }

    #[tokio::test]
    async fn unknown_story_is_not_found() {
        let svc = service();
        let err = svc.fork(StoryId::new(), ActorId::new()).await.unwrap_err();
        assert!(matches!(err, MutationError::StoryNotFound(_)));
        assert!(svc.slots().is_empty());
    }

    #[tokio::test]
    async fn denied_actor_never_touches_slot() {
        let guard = Arc::new(StaticGuard::new());
        let svc = MutationService::new(
            ForkConfig::default(),
            Arc::new(MemoryStore::new()),
            guard.clone(),
        );
        let owner = ActorId::new();
        let project = ProjectId::new();
        guard.grant_editor(owner, project);
        let story = svc
            .create_story(owner, project, "s", base())
            .await
            .unwrap()
            .story_id;

        let _held = svc.slots().acquire(story).await;
        // returns immediately even though the slot is held
        let err = svc.fork(story, ActorId::new()).await.unwrap_err();
        assert!(matches!(err, MutationError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn create_story_requires_edit() {
        let svc = MutationService::new(
            ForkConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticGuard::new()),
        );
        let err = svc
            .create_story(ActorId::new(), ProjectId::new(), "s", base())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::PermissionDenied { capability: "edit", .. }));
    }

    #[tokio::test]
    async fn configured_width_is_applied() {
        let svc = MutationService::new(
            ForkConfig::default().with_max_branches(4),
            Arc::new(MemoryStore::new()),
            Arc::new(AllowAll),
        );
        let actor = ActorId::new();
        let story = svc
            .create_story(actor, ProjectId::new(), "s", base())
            .await
            .unwrap()
            .story_id;
        svc.fork(story, actor).await.unwrap();
        svc.extend(story, actor).await.unwrap();
        let four = svc.extend(story, actor).await.unwrap();
        assert_eq!(four.tree.branch_count(), 4);
        assert!(svc.extend(story, actor).await.is_err());
    }

    #[tokio::test]
    async fn rename_and_edit() {
        let svc = service();
        let actor = ActorId::new();
        let story = svc
            .create_story(actor, ProjectId::new(), "s", base())
            .await
            .unwrap()
            .story_id;

        let edited = svc
            .edit_content(story, actor, ContentTarget::Base, Content::empty())
            .await
            .unwrap();
        assert!(edited.tree.base.is_empty());

        svc.fork(story, actor).await.unwrap();
        let renamed = svc
            .rename_branch(story, actor, BranchId(2), "fallback")
            .await
            .unwrap();
        assert_eq!(renamed.view().branches[1].label, "fallback");

        let err = svc
            .rename_branch(story, actor, BranchId(2), "")
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::InvalidInput(_)));
    }
}
