//! Concurrent collaborators on the same and on different stories

use std::sync::Arc;
use std::time::Duration;
use storyfork_core::{BranchId, ContentTarget, DeleteKind, ForkConfig};
use storyfork_service::MutationError;
use storyfork_test_utils::{assert_legal, collapses_into, greeting, said, Fixture};
use tokio::sync::Barrier;
use tokio_test::{assert_pending, task};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_extends_admit_exactly_one() {
    for _ in 0..50 {
        let fx = Fixture::new();
        let story = fx.forked_story().await;
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for actor in [fx.editor, fx.collaborator()] {
            let service = Arc::clone(&fx.service);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                service.extend(story, actor).await
            }));
        }

        let mut ok = 0;
        let mut refused = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(committed) => {
                    assert_eq!(committed.tree.branch_count(), 3);
                    ok += 1;
                }
                Err(MutationError::InvalidTransition { shape, .. }) => {
                    assert_eq!(shape.branch_count, 3);
                    refused += 1;
                }
                Err(other) => panic!("unexpected refusal: {other}"),
            }
        }
        assert_eq!((ok, refused), (1, 1));
        assert_eq!(fx.service.view(story).await.unwrap().branch_count, 3);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribers_never_observe_illegal_counts() {
    let fx = Fixture::new();
    let story = fx.story(greeting()).await;
    let mut sub = fx.service.subscribe(story, fx.editor).await.unwrap();

    let actors: Vec<_> = (0..4).map(|_| fx.collaborator()).collect();
    let mut handles = Vec::new();
    for (i, actor) in actors.into_iter().enumerate() {
        let service = Arc::clone(&fx.service);
        handles.push(tokio::spawn(async move {
            for round in 0..25u32 {
                let _ = match (i + round as usize) % 4 {
                    0 => service.fork(story, actor).await,
                    1 => service.extend(story, actor).await,
                    _ => {
                        let target = BranchId(round % 8 + 1);
                        service.commit_delete(story, actor, target, true).await
                    }
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let last = fx.service.view(story).await.unwrap();
    let mut seen = 0u64;
    let wait = Duration::from_millis(100);
    while let Ok(Some(view)) = tokio::time::timeout(wait, sub.next()).await {
        assert_legal(&view, 3);
        assert!(view.version > seen, "versions must increase");
        seen = view.version;
        if view.version == last.version {
            break;
        }
    }
    assert_eq!(seen, last.version);
}

#[tokio::test]
async fn stale_simple_plan_becomes_concurrent_modification() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;
    fx.service.extend(story, fx.editor).await.unwrap();
    let other = fx.collaborator();

    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    assert_eq!(plan.kind, DeleteKind::Simple);

    // a collaborator deletes a sibling first
    fx.service
        .commit_delete(story, other, BranchId(3), false)
        .await
        .unwrap();

    let err = fx
        .service
        .commit_planned_delete(fx.editor, &plan, true)
        .await
        .unwrap_err();
    match err {
        MutationError::ConcurrentModification {
            expected,
            actual,
            ..
        } => {
            assert_eq!(expected, DeleteKind::Simple);
            assert_eq!(actual, collapses_into(2));
        }
        other => panic!("expected ConcurrentModification, got {other:?}"),
    }
    assert_eq!(fx.service.view(story).await.unwrap().branch_count, 2);

    // re-plan and confirm the cascade
    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    let committed = fx
        .service
        .commit_planned_delete(fx.editor, &plan, true)
        .await
        .unwrap();
    assert_eq!(committed.tree.branch_count(), 0);
}

#[tokio::test]
async fn cascade_with_new_survivor_is_refused() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;
    let other = fx.collaborator();
    fx.service
        .edit_content(story, fx.editor, ContentTarget::Branch(BranchId(2)), said("keep-me"))
        .await
        .unwrap();

    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    assert_eq!(plan.kind, collapses_into(2));

    // collaborator swaps the would-be survivor for a new branch
    fx.service.extend(story, other).await.unwrap();
    fx.service
        .edit_content(story, other, ContentTarget::Branch(BranchId(3)), said("other"))
        .await
        .unwrap();
    fx.service
        .commit_delete(story, other, BranchId(2), false)
        .await
        .unwrap();
    let before = fx.service.snapshot(story).await.unwrap();

    let err = fx
        .service
        .commit_planned_delete(fx.editor, &plan, true)
        .await
        .unwrap_err();
    assert!(err.requires_reprompt());
    match err {
        MutationError::ConcurrentModification {
            expected,
            actual,
            ..
        } => {
            assert_eq!(expected, collapses_into(2));
            assert_eq!(actual, collapses_into(3));
        }
        other => panic!("expected ConcurrentModification, got {other:?}"),
    }

    let after = fx.service.snapshot(story).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.base, greeting());
}

#[tokio::test]
async fn cascade_that_became_simple_is_refused() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;

    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    assert!(plan.requires_confirmation());
    fx.service.extend(story, fx.collaborator()).await.unwrap();

    let err = fx
        .service
        .commit_planned_delete(fx.editor, &plan, true)
        .await
        .unwrap_err();
    match err {
        MutationError::ConcurrentModification {
            expected,
            actual,
            ..
        } => {
            assert_eq!(expected, collapses_into(2));
            assert_eq!(actual, DeleteKind::Simple);
        }
        other => panic!("expected ConcurrentModification, got {other:?}"),
    }
    assert_eq!(fx.service.view(story).await.unwrap().branch_count, 3);

    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    let committed = fx
        .service
        .commit_planned_delete(fx.editor, &plan, false)
        .await
        .unwrap();
    assert_eq!(committed.tree.branch_count(), 2);
}

#[tokio::test]
async fn unrelated_commits_keep_plan_valid() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;
    let other = fx.collaborator();

    let plan = fx.service.plan_delete(story, BranchId(1)).await.unwrap();
    fx.service
        .rename_branch(story, other, BranchId(2), "fallback")
        .await
        .unwrap();
    fx.service
        .edit_content(story, other, ContentTarget::Branch(BranchId(2)), said("late"))
        .await
        .unwrap();

    let committed = fx
        .service
        .commit_planned_delete(fx.editor, &plan, true)
        .await
        .unwrap();
    assert_eq!(committed.tree.branch_count(), 0);
    assert_eq!(committed.tree.base, said("late"));
    assert!(committed.tree.version > plan.based_on_version + 1);
}

#[tokio::test]
async fn stale_plan_for_vanished_branch_is_not_found() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;
    fx.service.extend(story, fx.editor).await.unwrap();

    let plan = fx.service.plan_delete(story, BranchId(3)).await.unwrap();
    fx.service
        .commit_delete(story, fx.collaborator(), BranchId(3), false)
        .await
        .unwrap();

    let err = fx
        .service
        .commit_planned_delete(fx.editor, &plan, false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn cancelled_waiter_changes_nothing() {
    let fx = Fixture::new();
    let story = fx.forked_story().await;
    let before = fx.service.snapshot(story).await.unwrap();

    let held = fx.service.slots().acquire(story).await;
    {
        let mut pending = task::spawn(fx.service.extend(story, fx.editor));
        assert_pending!(pending.poll());
        // dropped while queued behind the held slot
    }
    drop(held);
    assert!(fx.service.slots().is_empty());

    assert_eq!(fx.service.snapshot(story).await.unwrap(), before);
    let committed = fx.service.extend(story, fx.editor).await.unwrap();
    assert_eq!(committed.tree.version, before.version + 1);
}

#[tokio::test]
async fn other_stories_proceed_while_one_is_held() {
    let fx = Fixture::new();
    let busy = fx.forked_story().await;
    let free = fx.forked_story().await;

    let _held = fx.service.slots().acquire(busy).await;
    let committed = tokio::time::timeout(
        Duration::from_millis(200),
        fx.service.extend(free, fx.editor),
    )
    .await
    .expect("unrelated story must not block")
    .unwrap();
    assert_eq!(committed.tree.branch_count(), 3);

    // and the held story does block
    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        fx.service.extend(busy, fx.editor),
    )
    .await;
    assert!(blocked.is_err());
    assert_eq!(fx.service.view(busy).await.unwrap().branch_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wider_forks_stay_within_limit() {
    let fx = Fixture::with_config(ForkConfig::default().with_max_branches(5));
    let story = fx.forked_story().await;
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&fx.service);
        let barrier = Arc::clone(&barrier);
        let actor = fx.collaborator();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service.extend(story, actor).await.is_ok()
        }));
    }
    let mut accepted = 0;
    for h in handles {
        if h.await.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(fx.service.view(story).await.unwrap().branch_count, 5);
}
