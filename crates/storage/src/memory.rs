//! In-memory `SnapshotStore` backend.
//!
//! Committed rows live behind a shared mutex. A transaction stages its
//! inserts, updates and deletes in an overlay that is applied on commit and
//! thrown away on abort or drop. Owner locks are async mutexes held by the
//! transaction until it ends; a lock nobody holds or waits for is removed
//! from the lock table when its transaction ends.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::record::{
    sort_records, NewSnapshot, OwnerRef, SnapshotId, SnapshotOrder, SnapshotRecord,
};
use crate::traits::SnapshotStore;

/// Cloneable handle to a shared in-memory snapshot table.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    owner_locks: Mutex<HashMap<OwnerRef, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Default)]
struct State {
    last_id: i64,
    rows: BTreeMap<SnapshotId, SnapshotRecord>,
}

/// Pending writes and held owner locks for one in-memory transaction.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    guards: HashMap<OwnerRef, OwnedMutexGuard<()>>,
    inserted: BTreeMap<SnapshotId, SnapshotRecord>,
    updated: BTreeMap<SnapshotId, SnapshotRecord>,
    deleted: BTreeSet<SnapshotId>,
}

impl MemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            guards: HashMap::new(),
            inserted: BTreeMap::new(),
            updated: BTreeMap::new(),
            deleted: BTreeSet::new(),
        }
    }

    fn ensure_locked(&self, owner: &OwnerRef) -> Result<(), StorageError> {
        if self.guards.contains_key(owner) {
            Ok(())
        } else {
            Err(StorageError::OwnerNotLocked {
                owner: owner.clone(),
            })
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.guards.is_empty() {
            return;
        }
        let owners: Vec<OwnerRef> = self.guards.keys().cloned().collect();
        self.guards.clear();
        self.shared.prune_owner_locks(&owners);
    }
}

impl Shared {
    /// Forget the locks of `owners` that no transaction holds or waits on.
    ///
    /// Lock handles are only cloned under the `owner_locks` mutex, so a
    /// strong count of one seen here cannot grow until it is released.
    fn prune_owner_locks(&self, owners: &[OwnerRef]) {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for owner in owners {
            if locks.get(owner).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(owner);
            }
        }
    }
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total committed snapshots across every owner.
    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn owner_lock_entries(&self) -> usize {
        self.shared
            .owner_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn owner_lock(&self, owner: &OwnerRef) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .shared
            .owner_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(owner.clone()).or_default().clone()
    }

    /// Rows for `owner` as seen from inside `tx`.
    fn view(&self, tx: &MemoryTransaction, owner: &OwnerRef) -> Vec<SnapshotRecord> {
        let state = self.state();
        let mut rows: Vec<SnapshotRecord> = state
            .rows
            .values()
            .filter(|r| &r.owner == owner && !tx.deleted.contains(&r.id))
            .map(|r| tx.updated.get(&r.id).unwrap_or(r).clone())
            .collect();
        rows.extend(tx.inserted.values().filter(|r| &r.owner == owner).cloned());
        rows
    }

    /// Locate a row visible to `tx` by id.
    fn find(&self, tx: &MemoryTransaction, id: SnapshotId) -> Option<SnapshotRecord> {
        if let Some(r) = tx.inserted.get(&id) {
            return Some(r.clone());
        }
        if tx.deleted.contains(&id) {
            return None;
        }
        if let Some(r) = tx.updated.get(&id) {
            return Some(r.clone());
        }
        self.state().rows.get(&id).cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    type Transaction = MemoryTransaction;

    async fn begin_transaction(&self) -> Result<MemoryTransaction, StorageError> {
        Ok(MemoryTransaction::new(Arc::clone(&self.shared)))
    }

    async fn commit_transaction(&self, mut tx: MemoryTransaction) -> Result<(), StorageError> {
        {
            let mut state = self.state();
            for id in &tx.deleted {
                state.rows.remove(id);
            }
            for (id, record) in std::mem::take(&mut tx.updated) {
                if let Some(row) = state.rows.get_mut(&id) {
                    row.active = record.active;
                }
            }
            state.rows.append(&mut tx.inserted);
        }
        // Release owner locks only after the writes are visible.
        drop(tx);
        Ok(())
    }

    async fn abort_transaction(&self, tx: MemoryTransaction) -> Result<(), StorageError> {
        drop(tx);
        Ok(())
    }

    async fn lock_owner(
        &self,
        tx: &mut MemoryTransaction,
        owner: &OwnerRef,
    ) -> Result<(), StorageError> {
        if tx.guards.contains_key(owner) {
            return Ok(());
        }
        let guard = self.owner_lock(owner).lock_owned().await;
        tx.guards.insert(owner.clone(), guard);
        Ok(())
    }

    async fn insert_snapshot(
        &self,
        tx: &mut MemoryTransaction,
        snapshot: NewSnapshot,
    ) -> Result<SnapshotId, StorageError> {
        tx.ensure_locked(&snapshot.owner)?;
        let id = {
            let mut state = self.state();
            state.last_id += 1;
            SnapshotId(state.last_id)
        };
        tx.inserted.insert(id, SnapshotRecord::from_new(id, snapshot));
        Ok(id)
    }

    async fn list_by_owner(
        &self,
        tx: &mut MemoryTransaction,
        owner: &OwnerRef,
        order: SnapshotOrder,
    ) -> Result<Vec<SnapshotRecord>, StorageError> {
        let mut rows = self.view(tx, owner);
        sort_records(&mut rows, order);
        Ok(rows)
    }

    async fn count_by_owner(
        &self,
        tx: &mut MemoryTransaction,
        owner: &OwnerRef,
    ) -> Result<u64, StorageError> {
        Ok(self.view(tx, owner).len() as u64)
    }

    async fn update_snapshot(
        &self,
        tx: &mut MemoryTransaction,
        snapshot: &SnapshotRecord,
    ) -> Result<(), StorageError> {
        let mut current = self
            .find(tx, snapshot.id)
            .ok_or(StorageError::SnapshotNotFound { id: snapshot.id })?;
        if current.owner != snapshot.owner {
            return Err(StorageError::OwnerMismatch {
                id: snapshot.id,
                owner: snapshot.owner.clone(),
            });
        }
        tx.ensure_locked(&current.owner)?;
        current.active = snapshot.active;
        if let Some(row) = tx.inserted.get_mut(&snapshot.id) {
            *row = current;
        } else {
            tx.updated.insert(snapshot.id, current);
        }
        Ok(())
    }

    async fn delete_many(
        &self,
        tx: &mut MemoryTransaction,
        ids: &[SnapshotId],
    ) -> Result<(), StorageError> {
        for id in ids {
            let Some(row) = self.find(tx, *id) else {
                continue;
            };
            tx.ensure_locked(&row.owner)?;
            if tx.inserted.remove(id).is_none() {
                tx.updated.remove(id);
                tx.deleted.insert(*id);
            }
        }
        Ok(())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<SnapshotRecord, StorageError> {
        self.state()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StorageError::SnapshotNotFound { id })
    }

    async fn list_snapshots(
        &self,
        owner: &OwnerRef,
        order: SnapshotOrder,
    ) -> Result<Vec<SnapshotRecord>, StorageError> {
        let mut rows: Vec<SnapshotRecord> = self
            .state()
            .rows
            .values()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect();
        sort_records(&mut rows, order);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn owner(id: &str) -> OwnerRef {
        OwnerRef::new("article", id)
    }

    fn candidate(owner: &OwnerRef) -> NewSnapshot {
        NewSnapshot {
            owner: owner.clone(),
            schema: "version".to_string(),
            actor_id: None,
            active: true,
            payload: "{}".to_string(),
            reason: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn insert_without_lock_is_rejected() {
        let store = MemorySnapshotStore::new();
        let mut tx = store.begin_transaction().await.unwrap();
        let err = store
            .insert_snapshot(&mut tx, candidate(&owner("a-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::OwnerNotLocked { .. }));
    }

    #[tokio::test]
    async fn delete_of_staged_insert_never_reaches_table() {
        let store = MemorySnapshotStore::new();
        let o = owner("a-1");
        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &o).await.unwrap();
        let id = store.insert_snapshot(&mut tx, candidate(&o)).await.unwrap();
        store.delete_many(&mut tx, &[id]).await.unwrap();
        store.commit_transaction(tx).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ids_keep_increasing_after_abort() {
        let store = MemorySnapshotStore::new();
        let o = owner("a-1");

        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &o).await.unwrap();
        let first = store.insert_snapshot(&mut tx, candidate(&o)).await.unwrap();
        store.abort_transaction(tx).await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut tx, &o).await.unwrap();
        let second = store.insert_snapshot(&mut tx, candidate(&o)).await.unwrap();
        store.commit_transaction(tx).await.unwrap();

        assert!(second > first);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_releases_owner_lock() {
        let store = MemorySnapshotStore::new();
        let o = owner("a-1");
        {
            let mut tx = store.begin_transaction().await.unwrap();
            store.lock_owner(&mut tx, &o).await.unwrap();
        }
        let mut tx = store.begin_transaction().await.unwrap();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.lock_owner(&mut tx, &o),
        )
        .await
        .expect("lock should be free after drop")
        .unwrap();
    }

    #[tokio::test]
    async fn released_owner_locks_are_forgotten() {
        let store = MemorySnapshotStore::new();

        let mut committed = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut committed, &owner("a-1")).await.unwrap();
        let mut aborted = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut aborted, &owner("a-2")).await.unwrap();
        let mut dropped = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut dropped, &owner("a-3")).await.unwrap();
        assert_eq!(store.owner_lock_entries(), 3);

        store.commit_transaction(committed).await.unwrap();
        store.abort_transaction(aborted).await.unwrap();
        drop(dropped);
        assert_eq!(store.owner_lock_entries(), 0);
    }

    #[tokio::test]
    async fn contended_owner_lock_survives_first_release() {
        let store = MemorySnapshotStore::new();
        let o = owner("a-1");
        let mut first = store.begin_transaction().await.unwrap();
        store.lock_owner(&mut first, &o).await.unwrap();

        let waiter = {
            let store = store.clone();
            let o = o.clone();
            tokio::spawn(async move {
                let mut tx = store.begin_transaction().await.unwrap();
                store.lock_owner(&mut tx, &o).await.unwrap();
                store.insert_snapshot(&mut tx, candidate(&o)).await.unwrap();
                store.commit_transaction(tx).await.unwrap();
            })
        };
        // Let the waiter clone the lock handle and block on it.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        store.commit_transaction(first).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire the released lock")
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.owner_lock_entries(), 0);
    }
}
