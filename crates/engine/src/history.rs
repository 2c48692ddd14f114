//! Read-side history queries over committed snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use vellum_storage::{
    OwnerRef, SnapshotId, SnapshotOrder, SnapshotRecord, SnapshotStore, StorageError,
};

use crate::actor::ActorResolver;
use crate::attributes::{field, loose_eq, Attributes};
use crate::builder::decode_payload;
use crate::engine::VersioningEngine;
use crate::error::VersioningError;

/// A committed snapshot viewed as a version of its record.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    record: SnapshotRecord,
}

impl Version {
    pub fn id(&self) -> SnapshotId {
        self.record.id
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.record.owner
    }

    pub fn is_active(&self) -> bool {
        self.record.active
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.record.actor_id.as_deref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.record.reason.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.record.created_at
    }

    pub fn schema(&self) -> &str {
        &self.record.schema
    }

    pub fn record(&self) -> &SnapshotRecord {
        &self.record
    }

    pub fn into_record(self) -> SnapshotRecord {
        self.record
    }

    /// Decode the captured attribute map.
    pub fn attributes(&self) -> Result<Attributes, VersioningError> {
        Ok(decode_payload(&self.record.payload)?)
    }

    /// Field-level changes going from `self` to `newer`.
    pub fn diff(&self, newer: &Version) -> Result<VersionDiff, VersioningError> {
        Ok(VersionDiff::between(&self.attributes()?, &newer.attributes()?))
    }
}

impl From<SnapshotRecord> for Version {
    fn from(record: SnapshotRecord) -> Self {
        Self { record }
    }
}

/// One attribute's value before and after. `None` means absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Every attribute that is not loosely equal between two versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionDiff {
    pub changes: BTreeMap<String, FieldChange>,
}

impl VersionDiff {
    pub fn between(before: &Attributes, after: &Attributes) -> Self {
        let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        let mut changes = BTreeMap::new();
        for name in names {
            if !loose_eq(field(before, name), field(after, name)) {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        before: before.get(name).cloned(),
                        after: after.get(name).cloned(),
                    },
                );
            }
        }
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}

impl<S: SnapshotStore, A: ActorResolver> VersioningEngine<S, A> {
    /// Every committed version of `owner`, newest first.
    pub async fn versions(&self, owner: &OwnerRef) -> Result<Vec<Version>, VersioningError> {
        let records = self
            .store()
            .list_snapshots(owner, SnapshotOrder::NewestFirst)
            .await?;
        Ok(records.into_iter().map(Version::from).collect())
    }

    /// The active version of `owner`, if it has any history.
    pub async fn current_version(
        &self,
        owner: &OwnerRef,
    ) -> Result<Option<Version>, VersioningError> {
        let records = self
            .store()
            .list_snapshots(owner, SnapshotOrder::NewestFirst)
            .await?;
        Ok(records.into_iter().find(|r| r.active).map(Version::from))
    }

    /// The newest version of `owner` created strictly before `reference`.
    pub async fn previous_version(
        &self,
        owner: &OwnerRef,
        reference: SnapshotId,
    ) -> Result<Option<Version>, VersioningError> {
        let records = self
            .store()
            .list_snapshots(owner, SnapshotOrder::NewestFirst)
            .await?;
        let anchor = records
            .iter()
            .find(|r| r.id == reference)
            .map(SnapshotRecord::order_key)
            .ok_or_else(|| VersioningError::VersionNotFound {
                owner: owner.clone(),
                id: reference,
            })?;
        Ok(records
            .into_iter()
            .find(|r| r.order_key() < anchor)
            .map(Version::from))
    }

    /// A single version, checked to belong to `owner`.
    pub async fn version(
        &self,
        owner: &OwnerRef,
        id: SnapshotId,
    ) -> Result<Version, VersioningError> {
        let not_found = || VersioningError::VersionNotFound {
            owner: owner.clone(),
            id,
        };
        let record = match self.store().get_snapshot(id).await {
            Ok(record) => record,
            Err(StorageError::SnapshotNotFound { .. }) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if &record.owner != owner {
            return Err(not_found());
        }
        Ok(Version::from(record))
    }

    /// Attributes to write back onto the record to revert it to `id`.
    ///
    /// The host saves them like any other update; deduplication then
    /// reactivates the restored version instead of copying it.
    pub async fn restore_attributes(
        &self,
        owner: &OwnerRef,
        id: SnapshotId,
    ) -> Result<Attributes, VersioningError> {
        self.version(owner, id).await?.attributes()
    }
}
