use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskmaster::error::TaskmasterError;
use taskmaster::scheduler::snapshot::{snapshot_path, write_snapshot};
use taskmaster::scheduler::{GroupRouter, Snapshot, Task, TaskState};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn open_router(dir: &TempDir) -> GroupRouter {
    let (router, _fatal_rx) = GroupRouter::open(
        dir.path(),
        Duration::from_secs(60),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    router
}

#[tokio::test]
async fn test_groups_are_isolated() {
    let dir = TempDir::new().unwrap();
    let router = open_router(&dir).await;

    router.insert("a", "p".to_string()).await.unwrap();

    assert!(matches!(
        router.query("b", Duration::from_secs(1)).await,
        Err(TaskmasterError::GroupNotFound(_))
    ));
    let task = router.query("a", Duration::from_secs(1)).await.unwrap();
    assert_eq!(task.payload, "p");
}

#[tokio::test]
async fn test_unknown_group_operations_are_not_found() {
    let dir = TempDir::new().unwrap();
    let router = open_router(&dir).await;

    let err = router.finish("nope", "id").await.unwrap_err();
    assert!(err.is_not_found());
    let err = router.extend("nope", "id", Utc::now()).await.unwrap_err();
    assert!(matches!(err, TaskmasterError::GroupNotFound(_)));

    // Only Insert creates groups.
    assert!(router.group_names().await.is_empty());
}

#[tokio::test]
async fn test_empty_group_query() {
    let dir = TempDir::new().unwrap();
    let router = open_router(&dir).await;

    let id = router.insert("solo", "x".to_string()).await.unwrap();
    router.finish("solo", &id).await.unwrap();

    assert!(matches!(
        router.query("solo", Duration::from_secs(1)).await,
        Err(TaskmasterError::NoTaskAvailable)
    ));
}

#[tokio::test]
async fn test_invalid_group_rejected() {
    let dir = TempDir::new().unwrap();
    let router = open_router(&dir).await;

    for group in ["", "../escape", ".hidden", "a/b"] {
        assert!(matches!(
            router.insert(group, "x".to_string()).await,
            Err(TaskmasterError::InvalidGroup(_))
        ));
    }
    assert!(router.group_names().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_inserts_create_one_group() {
    let dir = TempDir::new().unwrap();
    let router = Arc::new(open_router(&dir).await);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.insert("shared", format!("task-{}", i)).await })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(router.group_names().await, vec!["shared".to_string()]);
    assert_eq!(router.get("shared").await.unwrap().len().await, 16);
}

#[tokio::test]
async fn test_startup_loads_existing_snapshots() {
    let dir = TempDir::new().unwrap();

    let now = Utc::now();
    let task = Task::new("persisted".to_string(), now);
    let snapshot = Snapshot {
        created_at: now,
        tasks: [(task.id.clone(), task.clone())].into_iter().collect(),
    };
    write_snapshot(&snapshot_path(dir.path(), "loaded"), &snapshot)
        .await
        .unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let router = open_router(&dir).await;
    assert_eq!(router.group_names().await, vec!["loaded".to_string()]);

    let leased = router.query("loaded", Duration::from_secs(30)).await.unwrap();
    assert_eq!(leased.id, task.id);
    assert_eq!(leased.payload, "persisted");
}

#[tokio::test]
async fn test_groups_persist_across_restart() {
    let dir = TempDir::new().unwrap();
    let shutdown = CancellationToken::new();
    let (router, _fatal_rx) =
        GroupRouter::open(dir.path(), Duration::from_millis(20), shutdown.clone())
            .await
            .unwrap();

    router.insert("alpha", "one".to_string()).await.unwrap();
    router.insert("beta", "two".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    drop(router);

    let router = open_router(&dir).await;
    assert_eq!(
        router.group_names().await,
        vec!["alpha".to_string(), "beta".to_string()]
    );
    let task = router.query("beta", Duration::from_secs(1)).await.unwrap();
    assert_eq!(task.payload, "two");
}

#[tokio::test]
async fn test_status_reports_lease_state() {
    let dir = TempDir::new().unwrap();
    let router = open_router(&dir).await;

    router.insert("zeta", "z".to_string()).await.unwrap();
    router.insert("alpha", "a1".to_string()).await.unwrap();
    router.insert("alpha", "a2".to_string()).await.unwrap();
    let leased = router.query("alpha", Duration::from_secs(60)).await.unwrap();

    let status = router.status().await;
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, "alpha");
    assert_eq!(status[0].task_count, 2);
    assert_eq!(status[1].name, "zeta");

    for task in &status[0].tasks {
        let expected = if task.id == leased.id {
            TaskState::Leased
        } else {
            TaskState::Pending
        };
        assert_eq!(task.state, expected);
    }
    assert_eq!(status[1].tasks[0].state, TaskState::Pending);
}

#[tokio::test]
async fn test_zero_snapshot_interval_rejected() {
    let dir = TempDir::new().unwrap();
    let result = GroupRouter::open(dir.path(), Duration::ZERO, CancellationToken::new()).await;
    assert!(matches!(result, Err(TaskmasterError::InvalidConfig(_))));
}
