//! Active-pointer manager.
//!
//! Both operations run inside the commit transaction while the owner lock
//! is held, so readers never observe two active snapshots for one owner.

use vellum_storage::{SnapshotId, SnapshotRecord, SnapshotStore, StorageError};

/// Clear the active flag on every snapshot in `history`.
///
/// Returns the number of snapshots that changed.
pub async fn deactivate_all<S: SnapshotStore>(
    store: &S,
    tx: &mut S::Transaction,
    history: &[SnapshotRecord],
) -> Result<usize, StorageError> {
    set_active(store, tx, history, None).await
}

/// Make `id` the only active snapshot in `history`.
///
/// Every other snapshot is deactivated before `id` is activated. Returns
/// the number of snapshots that changed.
pub async fn activate_only<S: SnapshotStore>(
    store: &S,
    tx: &mut S::Transaction,
    history: &[SnapshotRecord],
    id: SnapshotId,
) -> Result<usize, StorageError> {
    set_active(store, tx, history, Some(id)).await
}

async fn set_active<S: SnapshotStore>(
    store: &S,
    tx: &mut S::Transaction,
    history: &[SnapshotRecord],
    keep: Option<SnapshotId>,
) -> Result<usize, StorageError> {
    let mut changed = 0;
    for record in history.iter().filter(|r| r.active && Some(r.id) != keep) {
        let mut off = record.clone();
        off.active = false;
        store.update_snapshot(tx, &off).await?;
        changed += 1;
    }
    if let Some(target) = keep.and_then(|id| history.iter().find(|r| r.id == id)) {
        if !target.active {
            let mut on = target.clone();
            on.active = true;
            store.update_snapshot(tx, &on).await?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime};
    use vellum_storage::{MemorySnapshotStore, NewSnapshot, OwnerRef, SnapshotOrder};

    async fn seeded(actives: &[bool]) -> (MemorySnapshotStore, OwnerRef, Vec<SnapshotRecord>) {
        let store = MemorySnapshotStore::new();
        let owner = OwnerRef::new("article", "1");
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &owner).await.unwrap();
        for (i, active) in actives.iter().enumerate() {
            store
                .insert_snapshot(
                    &mut tx,
                    NewSnapshot {
                        owner: owner.clone(),
                        schema: "version".to_string(),
                        actor_id: None,
                        active: *active,
                        payload: "{}".to_string(),
                        reason: None,
                        created_at: OffsetDateTime::UNIX_EPOCH + Duration::seconds(i as i64),
                    },
                )
                .await
                .unwrap();
        }
        store.commit_transaction(tx).await.unwrap();
        let history = store
            .list_snapshots(&owner, SnapshotOrder::OldestFirst)
            .await
            .unwrap();
        (store, owner, history)
    }

    async fn active_ids(store: &MemorySnapshotStore, owner: &OwnerRef) -> Vec<SnapshotId> {
        store
            .list_snapshots(owner, SnapshotOrder::OldestFirst)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.active)
            .map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn deactivate_all_clears_every_flag() {
        let (store, owner, history) = seeded(&[true, true, false]).await;
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &owner).await.unwrap();
        let changed = deactivate_all(&store, &mut tx, &history).await.unwrap();
        store.commit_transaction(tx).await.unwrap();

        assert_eq!(changed, 2);
        assert!(active_ids(&store, &owner).await.is_empty());
    }

    #[tokio::test]
    async fn activate_only_moves_the_pointer() {
        let (store, owner, history) = seeded(&[false, true]).await;
        let target = history[0].id;
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &owner).await.unwrap();
        let changed = activate_only(&store, &mut tx, &history, target)
            .await
            .unwrap();
        store.commit_transaction(tx).await.unwrap();

        assert_eq!(changed, 2);
        assert_eq!(active_ids(&store, &owner).await, vec![target]);
    }

    #[tokio::test]
    async fn activate_already_active_is_a_noop() {
        let (store, owner, history) = seeded(&[false, true]).await;
        let target = history[1].id;
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &owner).await.unwrap();
        let changed = activate_only(&store, &mut tx, &history, target)
            .await
            .unwrap();
        store.commit_transaction(tx).await.unwrap();

        assert_eq!(changed, 0);
        assert_eq!(active_ids(&store, &owner).await, vec![target]);
    }

    #[tokio::test]
    async fn pointer_change_invisible_until_commit() {
        let (store, owner, history) = seeded(&[false, true]).await;
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &owner).await.unwrap();
        activate_only(&store, &mut tx, &history, history[0].id)
            .await
            .unwrap();

        assert_eq!(active_ids(&store, &owner).await, vec![history[1].id]);
        store.abort_transaction(tx).await.unwrap();
        assert_eq!(active_ids(&store, &owner).await, vec![history[1].id]);
    }
}
