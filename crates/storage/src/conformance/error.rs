//! Error-variant conformance tests.

use std::future::Future;

use super::{make_snapshot, owner, seed, TestResult};
use crate::{OwnerRef, SnapshotId, SnapshotStore, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_unknown_snapshot_not_found",
        get_unknown_snapshot_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_unknown_snapshot_not_found",
        update_unknown_snapshot_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_with_foreign_owner_rejected",
        update_with_foreign_owner_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "error_display_contains_id",
        error_display_contains_id(factory).await,
    ));

    results
}

async fn get_unknown_snapshot_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_snapshot(SnapshotId(404)).await {
        Err(StorageError::SnapshotNotFound { id }) if id == SnapshotId(404) => Ok(()),
        Err(e) => Err(format!("expected SnapshotNotFound(404), got {e}")),
        Ok(r) => Err(format!("expected error, got snapshot {}", r.id)),
    }
}

async fn update_unknown_snapshot_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;
    let mut ghost = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get: {e}"))?;
    ghost.id = SnapshotId(ids[0].0 + 1_000);

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let result = storage.update_snapshot(&mut tx, &ghost).await;
    let _ = storage.abort_transaction(tx).await;

    match result {
        Err(StorageError::SnapshotNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected SnapshotNotFound, got {e}")),
        Ok(()) => Err("update of unknown snapshot succeeded".to_string()),
    }
}

async fn update_with_foreign_owner_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let other = OwnerRef::new("article", "a-2");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;
    let mut moved = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get: {e}"))?;
    moved.owner = other.clone();

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .lock_owner(&mut tx, &other)
        .await
        .map_err(|e| format!("lock other: {e}"))?;
    let result = storage.update_snapshot(&mut tx, &moved).await;
    let _ = storage.abort_transaction(tx).await;

    match result {
        Err(StorageError::OwnerMismatch { .. }) => Ok(()),
        Err(e) => Err(format!("expected OwnerMismatch, got {e}")),
        Ok(()) => Err("update moved a snapshot to another owner".to_string()),
    }
}

async fn error_display_contains_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_snapshot(SnapshotId(77)).await {
        Err(e) if e.to_string().contains("77") => Ok(()),
        Err(e) => Err(format!("error message does not name the id: {e}")),
        Ok(_) => Err("expected error for unknown snapshot".to_string()),
    }
}
