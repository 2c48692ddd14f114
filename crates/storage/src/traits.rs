use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{NewSnapshot, OwnerRef, SnapshotId, SnapshotOrder, SnapshotRecord};

/// The storage trait for vellum snapshot backends.
///
/// A `SnapshotStore` implementation provides durable, transactional storage
/// for snapshot records keyed by the identity of the record they belong to.
///
/// ## Transaction Semantics
///
/// All mutating operations take `&mut Self::Transaction`. The lifecycle is:
///
/// 1. `begin_transaction()` — start a transaction
/// 2. `lock_owner()` for every owner the transaction will write
/// 3. Call read/write methods with `&mut tx`
/// 4. `commit_transaction(tx)` — make all writes visible
///    OR `abort_transaction(tx)` — discard all writes
///
/// If a `Transaction` is dropped without committing, its writes MUST be
/// discarded and its owner locks released.
///
/// ## Owner Locks
///
/// `lock_owner` serializes transactions per owner (`SELECT ... FOR UPDATE`
/// on the owner's rows, an advisory lock, or an in-process mutex). While a
/// transaction holds the lock, no other transaction can lock the same owner.
/// Distinct owners never block each other.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so the engine can be
/// shared across async tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// The transaction type used by this storage backend.
    type Transaction: Send;

    // ── Transaction lifecycle ─────────────────────────────────────────────────

    /// Begin a new transaction.
    async fn begin_transaction(&self) -> Result<Self::Transaction, StorageError>;

    /// Commit a transaction, making all writes durable and visible.
    async fn commit_transaction(&self, tx: Self::Transaction) -> Result<(), StorageError>;

    /// Abort (roll back) a transaction, discarding all writes.
    async fn abort_transaction(&self, tx: Self::Transaction) -> Result<(), StorageError>;

    /// Take the per-owner write lock for the rest of the transaction.
    ///
    /// Locking an owner the transaction already holds is a no-op.
    async fn lock_owner(
        &self,
        tx: &mut Self::Transaction,
        owner: &OwnerRef,
    ) -> Result<(), StorageError>;

    // ── Snapshot operations (within transaction) ──────────────────────────────

    /// Insert a snapshot and return its newly assigned id.
    async fn insert_snapshot(
        &self,
        tx: &mut Self::Transaction,
        snapshot: NewSnapshot,
    ) -> Result<SnapshotId, StorageError>;

    /// All snapshots for `owner`, including this transaction's own writes.
    async fn list_by_owner(
        &self,
        tx: &mut Self::Transaction,
        owner: &OwnerRef,
        order: SnapshotOrder,
    ) -> Result<Vec<SnapshotRecord>, StorageError>;

    /// Number of snapshots for `owner`, including this transaction's writes.
    async fn count_by_owner(
        &self,
        tx: &mut Self::Transaction,
        owner: &OwnerRef,
    ) -> Result<u64, StorageError>;

    /// Persist a changed snapshot. Only the `active` flag may change.
    ///
    /// Returns `Err(StorageError::SnapshotNotFound)` for an unknown id and
    /// `Err(StorageError::OwnerMismatch)` if the owner differs from the
    /// stored one.
    async fn update_snapshot(
        &self,
        tx: &mut Self::Transaction,
        snapshot: &SnapshotRecord,
    ) -> Result<(), StorageError>;

    /// Delete snapshots by id. Ids that do not exist are ignored.
    async fn delete_many(
        &self,
        tx: &mut Self::Transaction,
        ids: &[SnapshotId],
    ) -> Result<(), StorageError>;

    // ── Query operations (committed state only) ───────────────────────────────

    /// Read a single committed snapshot.
    ///
    /// Returns `Err(StorageError::SnapshotNotFound)` if it does not exist.
    async fn get_snapshot(&self, id: SnapshotId) -> Result<SnapshotRecord, StorageError>;

    /// All committed snapshots for `owner` in the requested order.
    async fn list_snapshots(
        &self,
        owner: &OwnerRef,
        order: SnapshotOrder,
    ) -> Result<Vec<SnapshotRecord>, StorageError>;
}
