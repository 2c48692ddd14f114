//! Transaction isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a transaction,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{make_snapshot, owner, seed, TestResult};
use crate::{SnapshotOrder, SnapshotStore};

pub(super) async fn run_transaction_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "transaction",
        "begin_and_commit_empty_succeeds",
        begin_and_commit_empty_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "uncommitted_insert_invisible",
        uncommitted_insert_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "uncommitted_insert_visible_inside_transaction",
        uncommitted_insert_visible_inside_transaction(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "committed_insert_visible",
        committed_insert_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "aborted_insert_discarded",
        aborted_insert_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "dropped_transaction_discarded",
        dropped_transaction_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "aborted_update_discarded",
        aborted_update_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "aborted_delete_discarded",
        aborted_delete_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "transaction",
        "relock_same_owner_is_noop",
        relock_same_owner_is_noop(factory).await,
    ));

    results
}

async fn begin_and_commit_empty_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let id = storage
        .insert_snapshot(&mut tx, make_snapshot(&o, 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let listed = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!(
            "expected no committed snapshots, found {}",
            listed.len()
        ));
    }
    if storage.get_snapshot(id).await.is_ok() {
        return Err("uncommitted snapshot visible to get_snapshot".to_string());
    }

    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))
}

async fn uncommitted_insert_visible_inside_transaction<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .insert_snapshot(&mut tx, make_snapshot(&o, 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let count = storage
        .count_by_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("count: {e}"))?;
    if count != 1 {
        return Err(format!("expected count 1 inside transaction, got {count}"));
    }
    let listed = storage
        .list_by_owner(&mut tx, &o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if listed.len() != 1 {
        return Err(format!(
            "expected 1 snapshot inside transaction, got {}",
            listed.len()
        ));
    }

    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))
}

async fn committed_insert_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;

    let record = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.owner != o {
        return Err(format!("expected owner {o}, got {}", record.owner));
    }
    if record.actor_id.as_deref() != Some("tester") {
        return Err(format!("expected actor tester, got {:?}", record.actor_id));
    }
    if record.payload != make_snapshot(&o, 1).payload {
        return Err(format!("payload changed on round trip: {}", record.payload));
    }
    Ok(())
}

async fn aborted_insert_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .insert_snapshot(&mut tx, make_snapshot(&o, 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let listed = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("expected 0 snapshots after abort, got {}", listed.len()));
    }
    Ok(())
}

async fn dropped_transaction_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    {
        let mut tx = storage
            .begin_transaction()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .lock_owner(&mut tx, &o)
            .await
            .map_err(|e| format!("lock: {e}"))?;
        storage
            .insert_snapshot(&mut tx, make_snapshot(&o, 1))
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }

    let listed = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("expected 0 snapshots after drop, got {}", listed.len()));
    }

    // The owner lock must have been released with the dropped transaction.
    seed(&storage, &o, vec![make_snapshot(&o, 2)]).await?;
    Ok(())
}

async fn aborted_update_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let mut record = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get: {e}"))?;
    record.active = true;
    storage
        .update_snapshot(&mut tx, &record)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let after = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get after abort: {e}"))?;
    if after.active {
        return Err("aborted active flip persisted".to_string());
    }
    Ok(())
}

async fn aborted_delete_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .delete_many(&mut tx, &ids)
        .await
        .map_err(|e| format!("delete: {e}"))?;
    let inside = storage
        .count_by_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("count: {e}"))?;
    if inside != 0 {
        return Err(format!("expected 0 inside transaction after delete, got {inside}"));
    }
    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("snapshot missing after aborted delete: {e}"))?;
    Ok(())
}

async fn relock_same_owner_is_noop<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("relock: {e}"))?;
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))
}
