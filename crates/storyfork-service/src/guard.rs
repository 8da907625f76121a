//! Access guard seam
//!
//! The mapping from roles to capabilities lives outside this crate. The
//! service only asks yes/no questions and treats anything but `Ok(true)` as a
//! refusal.

use crate::error::GuardError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use storyfork_core::{ActorId, ProjectId};

/// Capabilities the service asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create stories and mutate their branch trees
    EditStory,
    /// Read snapshots and subscribe to changes
    ReadStory,
}

impl Capability {
    /// Verb used in refusal messages
    #[inline]
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::EditStory => "edit",
            Self::ReadStory => "read",
        }
    }
}

/// Capability oracle
#[async_trait]
pub trait AccessGuard: Send + Sync + std::fmt::Debug {
    /// Whether `actor` holds `capability` on `project`
    ///
    /// # Errors
    /// `GuardError::Unavailable` when the oracle cannot answer.
    async fn check(
        &self,
        actor: ActorId,
        project: ProjectId,
        capability: Capability,
    ) -> Result<bool, GuardError>;

    /// Fail-closed edit check
    async fn can_edit(&self, actor: ActorId, project: ProjectId) -> bool {
        self.allows(actor, project, Capability::EditStory).await
    }

    /// Fail-closed check of any capability
    async fn allows(&self, actor: ActorId, project: ProjectId, capability: Capability) -> bool {
        match self.check(actor, project, capability).await {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(%actor, %project, ?capability, "access guard failed closed: {}", e);
                false
            }
        }
    }
}

/// Guard granting everything to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessGuard for AllowAll {
    async fn check(&self, _: ActorId, _: ProjectId, _: Capability) -> Result<bool, GuardError> {
        Ok(true)
    }
}

/// In-process grant table
///
/// Can be switched offline to simulate an unreachable guard.
#[derive(Debug, Default)]
pub struct StaticGuard {
    grants: RwLock<HashMap<(ActorId, ProjectId), HashSet<Capability>>>,
    offline: AtomicBool,
}

impl StaticGuard {
    /// Create guard with no grants
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant one capability
    pub fn grant(&self, actor: ActorId, project: ProjectId, capability: Capability) {
        self.grants
            .write()
            .entry((actor, project))
            .or_default()
            .insert(capability);
    }

    /// Grant read and edit
    pub fn grant_editor(&self, actor: ActorId, project: ProjectId) {
        self.grant(actor, project, Capability::ReadStory);
        self.grant(actor, project, Capability::EditStory);
    }

    /// Remove one capability
    pub fn revoke(&self, actor: ActorId, project: ProjectId, capability: Capability) {
        if let Some(caps) = self.grants.write().get_mut(&(actor, project)) {
            caps.remove(&capability);
        }
    }

    /// Make every check fail with `GuardError::Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccessGuard for StaticGuard {
    async fn check(
        &self,
        actor: ActorId,
        project: ProjectId,
        capability: Capability,
    ) -> Result<bool, GuardError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GuardError::Unavailable("guard offline".to_string()));
        }
        Ok(self
            .grants
            .read()
            .get(&(actor, project))
            .is_some_and(|caps| caps.contains(&capability)))
    }
}
