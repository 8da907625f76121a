//! Testing utilities for storyfork workspace
//!
//! Shared test helpers, fixtures, and assertions.

#![allow(missing_docs)]

use std::sync::Arc;
use storyfork_core::{
    ActorId, BranchId, Content, DeleteKind, DialogueStep, ForkConfig, ProjectId, StoryId, TreeView,
};
use storyfork_service::{MutationService, StaticGuard};
use storyfork_store::MemoryStore;

/// One user step
pub fn said(text: &str) -> Content {
    Content::from(vec![DialogueStep::user(text)])
}

/// Two-step greeting used as default base content
pub fn greeting() -> Content {
    Content::from(vec![DialogueStep::user("hello"), DialogueStep::bot("utter_hello")])
}

/// Delete that collapses the story into branch `survivor`
pub fn collapses_into(survivor: u32) -> DeleteKind {
    DeleteKind::Cascade {
        survivor: BranchId(survivor),
    }
}

/// Service with a grant table and one editor on one project
#[derive(Debug)]
pub struct Fixture {
    pub service: Arc<MutationService>,
    pub guard: Arc<StaticGuard>,
    pub store: Arc<MemoryStore>,
    pub editor: ActorId,
    pub project: ProjectId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ForkConfig::default())
    }

    pub fn with_config(config: ForkConfig) -> Self {
        let guard = Arc::new(StaticGuard::new());
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(MutationService::new(config, store.clone(), guard.clone()));
        let editor = ActorId::new();
        let project = ProjectId::new();
        guard.grant_editor(editor, project);
        Self {
            service,
            guard,
            store,
            editor,
            project,
        }
    }

    /// Another actor with edit rights on the fixture project
    pub fn collaborator(&self) -> ActorId {
        let actor = ActorId::new();
        self.guard.grant_editor(actor, self.project);
        actor
    }

    /// Unbranched story with the given base content
    pub async fn story(&self, base: Content) -> StoryId {
        self.service
            .create_story(self.editor, self.project, "story", base)
            .await
            .unwrap()
            .story_id
    }

    /// Story already forked into two branches
    pub async fn forked_story(&self) -> StoryId {
        let story = self.story(greeting()).await;
        self.service.fork(story, self.editor).await.unwrap();
        story
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Panic unless the view satisfies the branch-count invariant
pub fn assert_legal(view: &TreeView, max_branches: usize) {
    assert!(
        view.branch_count == 0 || (2..=max_branches).contains(&view.branch_count),
        "illegal branch count {} in {:?}",
        view.branch_count,
        view
    );
    assert_eq!(view.branches.len(), view.branch_count);
    assert_eq!(view.can_fork, view.branch_count == 0);
    assert_eq!(
        view.can_extend,
        view.branch_count > 0 && view.branch_count < max_branches
    );
}
