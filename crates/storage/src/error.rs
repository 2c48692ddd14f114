use crate::record::{OwnerRef, SnapshotId};

/// All errors that can be returned by a SnapshotStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No snapshot with the given id exists (or it is not visible yet).
    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: SnapshotId },

    /// An update tried to move a snapshot to a different owner.
    #[error("snapshot {id} does not belong to {owner}")]
    OwnerMismatch { id: SnapshotId, owner: OwnerRef },

    /// A write touched an owner the transaction never locked with
    /// `lock_owner`. Backends that cannot detect this may skip the check.
    #[error("owner {owner} is not locked by this transaction")]
    OwnerNotLocked { owner: OwnerRef },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
