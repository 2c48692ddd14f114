use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{make_snapshot, owner, TestResult};
use crate::{SnapshotOrder, SnapshotStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

/// How long a blocked lock attempt is given before it counts as blocked.
const BLOCK_PROBE: Duration = Duration::from_millis(50);

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "owner_lock_serializes_read_then_write",
        owner_lock_serializes_read_then_write(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "owner_lock_blocks_until_commit",
        owner_lock_blocks_until_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "distinct_owners_do_not_block",
        distinct_owners_do_not_block(factory).await,
    ));

    results
}

// ── Read-then-write under the owner lock ────────────────────────────────────

/// N tasks each lock the same owner, count its snapshots, and insert one
/// snapshot recording the count they saw. With a working owner lock every
/// task sees a distinct count `0..N`; a lost update shows up as a repeat.
async fn owner_lock_serializes_read_then_write<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let o = owner("a-1");

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let o = o.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = s.begin_transaction().await?;
            s.lock_owner(&mut tx, &o).await?;
            let seen = s.count_by_owner(&mut tx, &o).await?;
            tokio::task::yield_now().await;
            let mut snapshot = make_snapshot(&o, i as i64);
            snapshot.payload = seen.to_string();
            s.insert_snapshot(&mut tx, snapshot).await?;
            s.commit_transaction(tx).await?;
            Ok::<u64, StorageError>(seen)
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        let count = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        seen.push(count);
    }
    seen.sort_unstable();
    let expected: Vec<u64> = (0..N as u64).collect();
    if seen != expected {
        return Err(format!("expected counts {expected:?}, got {seen:?}"));
    }

    let total = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?
        .len();
    if total != N {
        return Err(format!("expected {N} snapshots, got {total}"));
    }
    Ok(())
}

// ── A second locker waits for the first to finish ───────────────────────────

async fn owner_lock_blocks_until_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let o = owner("a-1");

    let mut first = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin first: {e}"))?;
    storage
        .lock_owner(&mut first, &o)
        .await
        .map_err(|e| format!("lock first: {e}"))?;

    let s = storage.clone();
    let o2 = o.clone();
    let mut waiter = tokio::spawn(async move {
        let mut tx = s.begin_transaction().await?;
        s.lock_owner(&mut tx, &o2).await?;
        let count = s.count_by_owner(&mut tx, &o2).await?;
        s.abort_transaction(tx).await?;
        Ok::<u64, StorageError>(count)
    });

    if tokio::time::timeout(BLOCK_PROBE, &mut waiter).await.is_ok() {
        let _ = storage.abort_transaction(first).await;
        return Err("second transaction acquired a held owner lock".to_string());
    }

    storage
        .insert_snapshot(&mut first, make_snapshot(&o, 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_transaction(first)
        .await
        .map_err(|e| format!("commit first: {e}"))?;

    let count = waiter
        .await
        .map_err(|e| format!("task panic: {e}"))?
        .map_err(|e| format!("storage error: {e}"))?;
    if count != 1 {
        return Err(format!("waiter should see the committed insert, saw {count}"));
    }
    Ok(())
}

// ── Independent owners ──────────────────────────────────────────────────────

async fn distinct_owners_do_not_block<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let held = owner("a-1");
    let free = owner("a-2");

    let mut first = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin first: {e}"))?;
    storage
        .lock_owner(&mut first, &held)
        .await
        .map_err(|e| format!("lock first: {e}"))?;

    let s = storage.clone();
    let other = tokio::spawn(async move {
        let mut tx = s.begin_transaction().await?;
        s.lock_owner(&mut tx, &free).await?;
        s.insert_snapshot(&mut tx, make_snapshot(&free, 1)).await?;
        s.commit_transaction(tx).await
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), other).await;
    let _ = storage.abort_transaction(first).await;

    match outcome {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(format!("storage error: {e}")),
        Ok(Err(e)) => Err(format!("task panic: {e}")),
        Err(_) => Err("lock on one owner blocked a different owner".to_string()),
    }
}
