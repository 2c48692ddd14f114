//! Retention purger.

use vellum_storage::{
    OwnerRef, SnapshotId, SnapshotOrder, SnapshotRecord, SnapshotStore, StorageError,
};

/// Pick the snapshots to delete so that at most `keep` remain.
///
/// `history` must be ordered oldest first. `keep == 0` means unlimited.
/// The active snapshot is never picked: when it is among the oldest, the
/// next-oldest inactive snapshots go instead.
///
/// So after an older snapshot is reactivated, the survivors are the active
/// one plus the newest `keep - 1` inactive ones, not the newest `keep`
/// overall.
pub fn plan_purge(history: &[SnapshotRecord], keep: usize) -> Vec<SnapshotId> {
    if keep == 0 || history.len() <= keep {
        return Vec::new();
    }
    let excess = history.len() - keep;
    history
        .iter()
        .filter(|r| !r.active)
        .take(excess)
        .map(|r| r.id)
        .collect()
}

/// Delete the oldest snapshots of `owner` beyond `keep`.
///
/// Runs inside the commit transaction after the new or reactivated
/// snapshot is in place. Returns the deleted ids, oldest first.
pub async fn purge<S: SnapshotStore>(
    store: &S,
    tx: &mut S::Transaction,
    owner: &OwnerRef,
    keep: usize,
) -> Result<Vec<SnapshotId>, StorageError> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let count = store.count_by_owner(tx, owner).await?;
    if count <= keep as u64 {
        return Ok(Vec::new());
    }
    let history = store
        .list_by_owner(tx, owner, SnapshotOrder::OldestFirst)
        .await?;
    let doomed = plan_purge(&history, keep);
    if !doomed.is_empty() {
        store.delete_many(tx, &doomed).await?;
    }
    Ok(doomed)
}
