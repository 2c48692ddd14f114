use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Snapshot type used when a record kind does not name its own.
pub const DEFAULT_SCHEMA: &str = "version";

/// Identity of the record a snapshot belongs to.
///
/// The pair is polymorphic over record kinds: `owner_type` names the kind
/// and `owner_id` is the record's stable key within that kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: String,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_type, self.owner_id)
    }
}

/// Store-assigned snapshot identifier. Strictly increasing per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub i64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordering for history scans. Both orders sort by `(created_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// A snapshot that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub owner: OwnerRef,
    /// Snapshot type / schema name (e.g. `"version"`).
    pub schema: String,
    /// Who triggered the change. `None` when no actor context exists.
    pub actor_id: Option<String>,
    pub active: bool,
    /// Opaque serialized capture of the record's attributes.
    pub payload: String,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A snapshot as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub owner: OwnerRef,
    pub schema: String,
    pub actor_id: Option<String>,
    pub active: bool,
    pub payload: String,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SnapshotRecord {
    /// Attach a store-assigned id to a candidate.
    pub fn from_new(id: SnapshotId, new: NewSnapshot) -> Self {
        Self {
            id,
            owner: new.owner,
            schema: new.schema,
            actor_id: new.actor_id,
            active: new.active,
            payload: new.payload,
            reason: new.reason,
            created_at: new.created_at,
        }
    }

    /// Sort key shared by every history ordering.
    pub fn order_key(&self) -> (OffsetDateTime, SnapshotId) {
        (self.created_at, self.id)
    }
}

/// Sort records in place according to `order`.
pub(crate) fn sort_records(records: &mut [SnapshotRecord], order: SnapshotOrder) {
    records.sort_by_key(SnapshotRecord::order_key);
    if order == SnapshotOrder::NewestFirst {
        records.reverse();
    }
}
