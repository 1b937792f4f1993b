mod common;

use chrono::Duration as ChronoDuration;
use common::{at, coordinator, task, user};
use futures::future::join_all;
use sisyphus::services::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_for_one_user_delete_once() {
    let store = Arc::new(MemoryStore::new());
    store.insert_user(user("u1", 7, 0));
    let now = at(2024, 5, 20, 9, 0, 0);
    for i in 0..5 {
        store.insert_task(task("u1", &format!("stale {}", i), now - ChronoDuration::hours(3 + i)));
    }
    store.insert_task(task("u1", "today", now - ChronoDuration::minutes(30)));
    // Widen the window between ledger read and ledger write.
    store.set_delete_delay(Some(Duration::from_millis(20)));

    let coordinator = coordinator(&store, 4);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_once_for_user("u1", now).await })
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let removed: u64 = outcomes.iter().map(|o| o.removed).sum();
    let purged = outcomes.iter().filter(|o| o.purged).count();
    assert_eq!(removed, 5);
    assert_eq!(purged, 1);
    assert_eq!(store.delete_calls(), 1);
    assert_eq!(store.tasks_for("u1").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_batch_runs_do_not_double_count() {
    let store = Arc::new(MemoryStore::new());
    let now = at(2024, 5, 20, 9, 0, 0);
    for u in 0..6 {
        let id = format!("user-{}", u);
        store.insert_user(user(&id, 0, 0));
        for i in 0..3 {
            store.insert_task(task(&id, &format!("old {}", i), now - ChronoDuration::days(1)));
        }
    }
    store.set_delete_delay(Some(Duration::from_millis(5)));

    let coordinator = coordinator(&store, 3);
    let runs: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_once(now).await })
        })
        .collect();

    let summaries: Vec<_> = join_all(runs)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let removed: u64 = summaries.iter().map(|s| s.total_tasks_removed).sum();
    let purged: usize = summaries.iter().map(|s| s.users_purged).sum();
    assert_eq!(removed, 18);
    assert_eq!(purged, 6);
    assert_eq!(store.delete_calls(), 6);
    assert!(summaries.iter().all(|s| s.users_evaluated == 6 && s.failures.is_empty()));
}

#[tokio::test]
async fn cancelled_before_start_touches_nobody() {
    let store = Arc::new(MemoryStore::new());
    let now = at(2024, 5, 20, 9, 0, 0);
    store.insert_user(user("u1", 0, 0));
    store.insert_task(task("u1", "old", now - ChronoDuration::days(1)));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = coordinator(&store, 2).run_once_with_cancel(now, &cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.users_evaluated, 0);
    assert_eq!(store.tasks_for("u1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_the_current_user_finish() {
    let store = Arc::new(MemoryStore::new());
    let now = at(2024, 5, 20, 9, 0, 0);
    for id in ["a", "b", "c"] {
        store.insert_user(user(id, 0, 0));
        store.insert_task(task(id, "old", now - ChronoDuration::days(1)));
    }
    store.set_delete_delay(Some(Duration::from_secs(10)));

    let coordinator = Arc::new(sisyphus::scheduler::PurgeCoordinator::new(
        store.clone(),
        Duration::from_secs(60),
        1,
    ));
    let cancel = CancellationToken::new();
    let run = {
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { coordinator.run_once_with_cancel(now, &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    let summary = run.await.unwrap().unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.users_evaluated, 1);
    assert_eq!(summary.total_tasks_removed, 1);
    let remaining: usize = ["a", "b", "c"].iter().map(|id| store.tasks_for(id).len()).sum();
    assert_eq!(remaining, 2);
}
