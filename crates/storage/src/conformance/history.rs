//! History conformance tests: ordering, counting, updates, deletes.

use std::future::Future;

use super::{make_snapshot, owner, seed, TestResult};
use crate::{OwnerRef, SnapshotOrder, SnapshotStore};

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "history",
        "ids_strictly_increase",
        ids_strictly_increase(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "list_orders_by_created_at",
        list_orders_by_created_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "equal_created_at_ordered_by_id",
        equal_created_at_ordered_by_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "owners_are_isolated",
        owners_are_isolated(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "count_matches_list",
        count_matches_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "update_flips_only_active",
        update_flips_only_active(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "delete_many_removes_listed_ids",
        delete_many_removes_listed_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "delete_many_ignores_unknown_ids",
        delete_many_ignores_unknown_ids(factory).await,
    ));

    results
}

async fn ids_strictly_increase<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let first = seed(&storage, &o, vec![make_snapshot(&o, 1), make_snapshot(&o, 2)]).await?;
    let second = seed(&storage, &o, vec![make_snapshot(&o, 3)]).await?;
    let ids: Vec<_> = first.into_iter().chain(second).collect();
    if ids.windows(2).any(|w| w[0] >= w[1]) {
        return Err(format!("ids not strictly increasing: {ids:?}"));
    }
    Ok(())
}

async fn list_orders_by_created_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    // Inserted out of chronological order on purpose.
    seed(
        &storage,
        &o,
        vec![
            make_snapshot(&o, 20),
            make_snapshot(&o, 10),
            make_snapshot(&o, 30),
        ],
    )
    .await?;

    let oldest = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list oldest: {e}"))?;
    let times: Vec<_> = oldest.iter().map(|r| r.created_at).collect();
    if times.windows(2).any(|w| w[0] > w[1]) {
        return Err(format!("OldestFirst not ascending: {times:?}"));
    }

    let newest = storage
        .list_snapshots(&o, SnapshotOrder::NewestFirst)
        .await
        .map_err(|e| format!("list newest: {e}"))?;
    let reversed: Vec<_> = newest.iter().rev().map(|r| r.id).collect();
    let ascending: Vec<_> = oldest.iter().map(|r| r.id).collect();
    if reversed != ascending {
        return Err(format!(
            "NewestFirst is not the reverse of OldestFirst: {reversed:?} vs {ascending:?}"
        ));
    }
    Ok(())
}

async fn equal_created_at_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(
        &storage,
        &o,
        vec![
            make_snapshot(&o, 5),
            make_snapshot(&o, 5),
            make_snapshot(&o, 5),
        ],
    )
    .await?;

    let listed: Vec<_> = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if listed != ids {
        return Err(format!("expected id order {ids:?}, got {listed:?}"));
    }
    Ok(())
}

async fn owners_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let article = owner("1");
    // Same id, different kind: must be a different owner.
    let comment = OwnerRef::new("comment", "1");
    seed(&storage, &article, vec![make_snapshot(&article, 1)]).await?;
    seed(
        &storage,
        &comment,
        vec![make_snapshot(&comment, 1), make_snapshot(&comment, 2)],
    )
    .await?;

    let articles = storage
        .list_snapshots(&article, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list article: {e}"))?;
    let comments = storage
        .list_snapshots(&comment, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list comment: {e}"))?;
    if articles.len() != 1 || comments.len() != 2 {
        return Err(format!(
            "expected 1 article and 2 comment snapshots, got {} and {}",
            articles.len(),
            comments.len()
        ));
    }
    if comments.iter().any(|r| r.owner != comment) {
        return Err("comment history contains a foreign owner".to_string());
    }
    Ok(())
}

async fn count_matches_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    seed(
        &storage,
        &o,
        (1..=4).map(|seq| make_snapshot(&o, seq)).collect(),
    )
    .await?;

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let count = storage
        .count_by_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("count: {e}"))?;
    let listed = storage
        .list_by_owner(&mut tx, &o, SnapshotOrder::NewestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?;
    storage
        .abort_transaction(tx)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    if count != 4 || listed.len() != 4 {
        return Err(format!(
            "expected 4 snapshots, count={count} list={}",
            listed.len()
        ));
    }
    Ok(())
}

async fn update_flips_only_active<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(&storage, &o, vec![make_snapshot(&o, 1)]).await?;
    let before = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get: {e}"))?;

    let mut changed = before.clone();
    changed.active = true;
    changed.payload = "{\"tampered\":true}".to_string();
    changed.reason = Some("tampered".to_string());

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .update_snapshot(&mut tx, &changed)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let after = storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("get after: {e}"))?;
    if !after.active {
        return Err("active flag not persisted".to_string());
    }
    if after.payload != before.payload || after.reason != before.reason {
        return Err("update changed fields other than active".to_string());
    }
    if after.created_at != before.created_at {
        return Err("update touched created_at".to_string());
    }
    Ok(())
}

async fn delete_many_removes_listed_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let o = owner("a-1");
    let ids = seed(
        &storage,
        &o,
        (1..=3).map(|seq| make_snapshot(&o, seq)).collect(),
    )
    .await?;

    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, &o)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .delete_many(&mut tx, &ids[..2])
        .await
        .map_err(|e| format!("delete: {e}"))?;
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let remaining: Vec<_> = storage
        .list_snapshots(&o, SnapshotOrder::OldestFirst)
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if remaining != vec![ids[2]] {
        return Err(format!("expected only {:?} to remain, got {remaining:?}", ids[2]));
    }
    Ok(())
}

async fn delete_many_ignores_unknown_ids<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .delete_many(&mut tx, &[crate::SnapshotId(ids[0].0 + 1_000)])
        .await
        .map_err(|e| format!("delete unknown: {e}"))?;
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    storage
        .get_snapshot(ids[0])
        .await
        .map_err(|e| format!("existing snapshot lost: {e}"))?;
    Ok(())
}
