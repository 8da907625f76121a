//! Concurrent mutation simulator
//!
//! Spawns a number of actors that hammer a shared set of stories with random
//! forks, extends, deletes, renames and edits. Every snapshot the service
//! publishes passes through an [`InvariantMonitor`] which checks:
//!
//! - branch count is 0 or within `2..=max_branches`
//! - branch ids are unique and keep their creation order
//! - each story's versions go up by exactly one per publish
//!
//! Refusals the service is allowed to make under contention
//! (`InvalidTransition`, stale branch ids, confirmations, concurrent
//! modification) are counted, anything else is a violation.
//!
//! The seed fixes each actor's operation sequence. The interleaving is up to
//! the runtime, so two runs with one seed can differ in their counts.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use storyfork_core::{
    ActorId, BranchId, Content, ContentTarget, DialogueStep, ForkConfig, ProjectId, StoryId,
    StoryTree,
};
use storyfork_service::{Broadcaster, MutationError, MutationService, StaticGuard};
use storyfork_store::MemoryStore;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Stories shared by all actors
    pub stories: usize,
    /// Concurrent actors
    pub actors: usize,
    /// Operations each actor performs
    pub ops_per_actor: u64,
    /// Engine configuration handed to the service
    pub fork: ForkConfig,
    /// Stop issuing operations once a violation is seen
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stories: 4,
            actors: 8,
            ops_per_actor: 250,
            fork: ForkConfig::default(),
            stop_on_first_violation: false,
        }
    }
}

/// One randomly chosen request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// Split an unbranched story
    Fork(StoryId),
    /// Add a branch
    Extend(StoryId),
    /// Delete directly, with or without confirmation
    Delete {
        story: StoryId,
        branch: BranchId,
        confirmed: bool,
    },
    /// Plan first, then commit the plan
    PlannedDelete { story: StoryId, branch: BranchId },
    /// Relabel a branch
    Rename {
        story: StoryId,
        branch: BranchId,
        label: String,
    },
    /// Replace base or branch content
    Edit {
        story: StoryId,
        target: ContentTarget,
    },
}

/// A broken guarantee
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Published tree has an illegal branch count
    IllegalShape {
        story: StoryId,
        version: u64,
        branch_count: usize,
    },
    /// Branch ids repeat or are out of creation order
    BranchOrder { story: StoryId, version: u64 },
    /// Version did not advance by exactly one
    VersionGap {
        story: StoryId,
        previous: u64,
        published: u64,
    },
    /// Committed tree never reached subscribers
    MissedPublish {
        story: StoryId,
        committed: u64,
        published: u64,
    },
    /// Story could not be read back
    Unreadable { story: StoryId, error: String },
    /// Refusal the service should never produce here
    UnexpectedError {
        operation: SimulatedOperation,
        error: String,
    },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub operations_attempted: u64,
    pub committed: u64,
    pub invalid_transitions: u64,
    pub stale_branches: u64,
    pub confirmations_required: u64,
    pub concurrent_modifications: u64,
    pub snapshots_published: u64,
}

impl SimulatorStats {
    fn absorb(&mut self, other: &Self) {
        self.operations_attempted += other.operations_attempted;
        self.committed += other.committed;
        self.invalid_transitions += other.invalid_transitions;
        self.stale_branches += other.stale_branches;
        self.confirmations_required += other.confirmations_required;
        self.concurrent_modifications += other.concurrent_modifications;
    }

    /// Refusals of any permitted kind
    #[must_use]
    pub fn refused(&self) -> u64 {
        self.invalid_transitions
            + self.stale_branches
            + self.confirmations_required
            + self.concurrent_modifications
    }
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
    /// Last committed tree of every story
    pub finals: Vec<Arc<StoryTree>>,
}

impl SimulatorReport {
    /// Whether no guarantee was broken
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== storyfork Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!(
            "Stories: {}  Actors: {}  Ops/actor: {}  Max branches: {}\n",
            self.config.stories,
            self.config.actors,
            self.config.ops_per_actor,
            self.config.fork.max_branches
        ));
        report.push_str(&format!("Operations Attempted: {}\n", self.stats.operations_attempted));
        report.push_str(&format!("Committed: {}\n", self.stats.committed));
        report.push_str(&format!("Invalid Transitions: {}\n", self.stats.invalid_transitions));
        report.push_str(&format!("Stale Branch Ids: {}\n", self.stats.stale_branches));
        report.push_str(&format!(
            "Confirmations Required: {}\n",
            self.stats.confirmations_required
        ));
        report.push_str(&format!(
            "Concurrent Modifications: {}\n",
            self.stats.concurrent_modifications
        ));
        report.push_str(&format!("Snapshots Published: {}\n", self.stats.snapshots_published));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        report.push_str("\n=== Final Trees ===\n");
        for tree in &self.finals {
            report.push_str(&format!(
                "{}  v{}  {}\n",
                tree.story_id,
                tree.version,
                tree.shape()
            ));
        }

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Broadcaster that checks every published tree
#[derive(Debug, Default)]
pub struct InvariantMonitor {
    last: Mutex<HashMap<StoryId, u64>>,
    violations: Mutex<Vec<Violation>>,
    published: AtomicU64,
}

impl InvariantMonitor {
    /// Create monitor with nothing seen yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last version published for a story
    #[must_use]
    pub fn last_version(&self, story: StoryId) -> Option<u64> {
        self.last.lock().get(&story).copied()
    }

    /// Snapshots seen so far
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Whether anything has been flagged
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.lock().is_empty()
    }

    /// Take the flagged violations
    pub fn drain(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.violations.lock())
    }

    fn flag(&self, violation: Violation) {
        tracing::warn!(?violation, "invariant violated");
        self.violations.lock().push(violation);
    }
}

impl Broadcaster for InvariantMonitor {
    fn publish(&self, story: StoryId, snapshot: Arc<StoryTree>) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let shape = snapshot.shape();
        if !shape.is_legal() {
            self.flag(Violation::IllegalShape {
                story,
                version: snapshot.version,
                branch_count: shape.branch_count,
            });
        }
        if snapshot.branches.windows(2).any(|w| w[0].id >= w[1].id) {
            self.flag(Violation::BranchOrder {
                story,
                version: snapshot.version,
            });
        }

        // stories are created at version 0 without a publish
        let previous = self.last.lock().insert(story, snapshot.version).unwrap_or(0);
        if snapshot.version != previous + 1 {
            self.flag(Violation::VersionGap {
                story,
                previous,
                published: snapshot.version,
            });
        }
    }
}

/// Run the simulator to completion
///
/// # Errors
/// Fails if the configuration is invalid or the stories cannot be created.
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    anyhow::ensure!(config.stories > 0, "need at least one story");
    anyhow::ensure!(config.actors > 0, "need at least one actor");
    config.fork.validate()?;

    let guard = Arc::new(StaticGuard::new());
    let monitor = Arc::new(InvariantMonitor::new());
    let service = Arc::new(
        MutationService::new(config.fork.clone(), Arc::new(MemoryStore::new()), guard.clone())
            .with_broadcaster(monitor.clone()),
    );

    let project = ProjectId::new();
    let actors: Vec<ActorId> = (0..config.actors).map(|_| ActorId::new()).collect();
    for actor in &actors {
        guard.grant_editor(*actor, project);
    }

    let mut stories = Vec::with_capacity(config.stories);
    for i in 0..config.stories {
        let base = Content::from(vec![
            DialogueStep::user(format!("hello {i}")),
            DialogueStep::bot("utter_greet"),
        ]);
        let tree = service
            .create_story(actors[0], project, format!("story {i}"), base)
            .await?;
        stories.push(tree.story_id);
    }
    let stories: Arc<[StoryId]> = stories.into();

    tracing::info!(
        seed = config.seed,
        stories = config.stories,
        actors = config.actors,
        ops = config.ops_per_actor,
        "simulation started"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(actors.len());
    for (i, actor) in actors.iter().copied().enumerate() {
        let worker = Actor {
            service: Arc::clone(&service),
            monitor: Arc::clone(&monitor),
            stories: Arc::clone(&stories),
            actor,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(i as u64)),
            stop: Arc::clone(&stop),
            stop_on_violation: config.stop_on_first_violation,
        };
        handles.push(tokio::spawn(worker.run(config.ops_per_actor)));
    }

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    for handle in handles {
        let (actor_stats, actor_violations) = handle.await?;
        stats.absorb(&actor_stats);
        violations.extend(actor_violations);
    }
    violations.extend(monitor.drain());
    stats.snapshots_published = monitor.published();

    let mut finals = Vec::with_capacity(stories.len());
    for story in stories.iter().copied() {
        let tree = service.snapshot(story).await?;
        let published = monitor.last_version(story).unwrap_or(0);
        if tree.version != published {
            violations.push(Violation::MissedPublish {
                story,
                committed: tree.version,
                published,
            });
        }
        finals.push(tree);
    }

    tracing::info!(
        committed = stats.committed,
        refused = stats.refused(),
        violations = violations.len(),
        "simulation finished"
    );

    Ok(SimulatorReport {
        config,
        stats,
        violations,
        finals,
    })
}

struct Actor {
    service: Arc<MutationService>,
    monitor: Arc<InvariantMonitor>,
    stories: Arc<[StoryId]>,
    actor: ActorId,
    rng: StdRng,
    stop: Arc<AtomicBool>,
    stop_on_violation: bool,
}

impl Actor {
    async fn run(mut self, ops: u64) -> (SimulatorStats, Vec<Violation>) {
        let mut stats = SimulatorStats::default();
        let mut violations = Vec::new();

        for n in 0..ops {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let story = self.stories[self.rng.gen_range(0..self.stories.len())];
            let operation = match self.next_operation(story, n).await {
                Ok(op) => op,
                Err(e) => {
                    violations.push(Violation::Unreadable {
                        story,
                        error: e.to_string(),
                    });
                    break;
                }
            };

            stats.operations_attempted += 1;
            match self.execute(&operation).await {
                Ok(()) => stats.committed += 1,
                Err(MutationError::InvalidTransition { .. }) => stats.invalid_transitions += 1,
                Err(MutationError::BranchNotFound { .. }) => stats.stale_branches += 1,
                Err(MutationError::ConfirmationRequired { .. }) => {
                    stats.confirmations_required += 1;
                }
                Err(MutationError::ConcurrentModification { .. }) => {
                    stats.concurrent_modifications += 1;
                }
                Err(e) => violations.push(Violation::UnexpectedError {
                    operation,
                    error: e.to_string(),
                }),
            }

            if self.stop_on_violation && (!violations.is_empty() || self.monitor.has_violations())
            {
                self.stop.store(true, Ordering::Relaxed);
            }
            if n % 16 == 0 {
                tokio::task::yield_now().await;
            }
        }

        (stats, violations)
    }

    /// Pick an operation against the story's last committed tree
    async fn next_operation(
        &mut self,
        story: StoryId,
        n: u64,
    ) -> Result<SimulatedOperation, MutationError> {
        let tree = self.service.snapshot(story).await?;

        // mostly live branches, sometimes one that may be gone by commit time
        let branch = if tree.branches.is_empty() || self.rng.gen_bool(0.1) {
            BranchId(self.rng.gen_range(1..=tree.branch_seq + 1))
        } else {
            tree.branches[self.rng.gen_range(0..tree.branches.len())].id
        };

        let op = match self.rng.gen_range(0..10) {
            0 | 1 => SimulatedOperation::Fork(story),
            2 | 3 => SimulatedOperation::Extend(story),
            4 | 5 => SimulatedOperation::Delete {
                story,
                branch,
                confirmed: self.rng.gen_bool(0.7),
            },
            6 | 7 => SimulatedOperation::PlannedDelete { story, branch },
            8 => SimulatedOperation::Rename {
                story,
                branch,
                label: format!("alt {n}"),
            },
            _ => SimulatedOperation::Edit {
                story,
                target: if tree.is_branched() {
                    ContentTarget::Branch(branch)
                } else {
                    ContentTarget::Base
                },
            },
        };
        Ok(op)
    }

    async fn execute(&mut self, operation: &SimulatedOperation) -> Result<(), MutationError> {
        let service = &self.service;
        let actor = self.actor;
        match operation {
            SimulatedOperation::Fork(story) => service.fork(*story, actor).await.map(drop),
            SimulatedOperation::Extend(story) => service.extend(*story, actor).await.map(drop),
            SimulatedOperation::Delete {
                story,
                branch,
                confirmed,
            } => service
                .commit_delete(*story, actor, *branch, *confirmed)
                .await
                .map(drop),
            SimulatedOperation::PlannedDelete { story, branch } => {
                let plan = service.plan_delete(*story, *branch).await?;
                // the actor accepts whatever warning the plan carried
                let confirmed = plan.requires_confirmation();
                service
                    .commit_planned_delete(actor, &plan, confirmed)
                    .await
                    .map(drop)
            }
            SimulatedOperation::Rename {
                story,
                branch,
                label,
            } => service
                .rename_branch(*story, actor, *branch, label.clone())
                .await
                .map(drop),
            SimulatedOperation::Edit { story, target } => {
                let content = Content::from(vec![DialogueStep::user(format!(
                    "edited by {actor}"
                ))]);
                service
                    .edit_content(*story, actor, *target, content)
                    .await
                    .map(drop)
            }
        }
    }
}
