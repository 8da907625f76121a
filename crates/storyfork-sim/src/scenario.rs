//! Scripted editing session
//!
//! Walks one story through fork, edit, extend, a simple delete and a
//! confirmed collapse, recording the committed view after every step.

use serde::Serialize;
use std::sync::Arc;
use storyfork_core::{
    ActorId, BranchId, Content, ContentTarget, DeleteKind, DialogueStep, Effect, ForkConfig,
    ProjectId, TreeView,
};
use storyfork_service::{AllowAll, Committed, MutationError, MutationService};
use storyfork_store::MemoryStore;

/// One recorded step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioStep {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    /// Why the service turned the request down, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    pub view: TreeView,
    pub base: Content,
}

impl ScenarioStep {
    fn committed(action: impl Into<String>, committed: &Committed) -> Self {
        Self {
            action: action.into(),
            effect: Some(committed.effect.clone()),
            refusal: None,
            view: committed.view(),
            base: committed.tree.base.clone(),
        }
    }
}

/// Run the scripted session
///
/// # Errors
/// Any step that the service refuses unexpectedly, or a final tree that does
/// not match the script.
pub async fn run_scenario(config: ForkConfig) -> anyhow::Result<Vec<ScenarioStep>> {
    let service = MutationService::new(config, Arc::new(MemoryStore::new()), Arc::new(AllowAll));
    let actor = ActorId::new();
    let mut steps = Vec::new();

    let base = Content::from(vec![
        DialogueStep::user("hello"),
        DialogueStep::bot("utter_hello"),
    ]);
    let tree = service
        .create_story(actor, ProjectId::new(), "greet", base)
        .await?;
    let story = tree.story_id;
    steps.push(ScenarioStep {
        action: "create".into(),
        effect: None,
        refusal: None,
        view: TreeView::of(&tree),
        base: tree.base.clone(),
    });

    let forked = service.fork(story, actor).await?;
    steps.push(ScenarioStep::committed("fork", &forked));

    let replacement = Content::from(vec![DialogueStep::user("xxx")]);
    let edited = service
        .edit_content(story, actor, ContentTarget::Branch(BranchId(2)), replacement.clone())
        .await?;
    steps.push(ScenarioStep::committed("edit b2", &edited));

    let extended = service.extend(story, actor).await?;
    steps.push(ScenarioStep::committed("extend", &extended));

    let plan = service.plan_delete(story, BranchId(1)).await?;
    anyhow::ensure!(plan.kind == DeleteKind::Simple, "b1 delete should be simple");
    let deleted = service.commit_planned_delete(actor, &plan, false).await?;
    steps.push(ScenarioStep::committed("delete b1", &deleted));

    let plan = service.plan_delete(story, BranchId(3)).await?;
    match service.commit_planned_delete(actor, &plan, false).await {
        Err(e @ MutationError::ConfirmationRequired { .. }) => {
            let tree = service.snapshot(story).await?;
            steps.push(ScenarioStep {
                action: "delete b3".into(),
                effect: None,
                refusal: Some(format!("{e}: {}", plan.confirmation_message())),
                view: TreeView::of(&tree),
                base: tree.base.clone(),
            });
        }
        Ok(_) => anyhow::bail!("collapse went through without confirmation"),
        Err(e) => return Err(e.into()),
    }

    let collapsed = service.commit_planned_delete(actor, &plan, true).await?;
    steps.push(ScenarioStep::committed("delete b3 (confirmed)", &collapsed));

    anyhow::ensure!(
        collapsed.tree.branch_count() == 0 && collapsed.tree.base == replacement,
        "collapse should promote b2 into the base"
    );
    tracing::info!(%story, steps = steps.len(), "scenario complete");
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn scenario_ends_collapsed() {
        let steps = run_scenario(ForkConfig::default()).await.unwrap();
        let actions: Vec<_> = steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "create",
                "fork",
                "edit b2",
                "extend",
                "delete b1",
                "delete b3",
                "delete b3 (confirmed)"
            ]
        );

        let counts: Vec<_> = steps.iter().map(|s| s.view.branch_count).collect();
        assert_eq!(counts, vec![0, 2, 2, 3, 2, 2, 0]);

        let refused = &steps[5];
        assert!(refused.refusal.as_deref().unwrap().contains("is also going to get deleted"));
        assert_eq!(steps.last().unwrap().view.version, 5);
    }

    #[tokio::test]
    async fn steps_serialize() {
        let steps = run_scenario(ForkConfig::default()).await.unwrap();
        let json = serde_json::to_value(&steps).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 7);
        assert!(json[0].get("effect").is_none());
        assert_eq!(json[1]["effect"]["effect"], "forked");
    }
}
