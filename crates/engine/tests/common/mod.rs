//! A minimal host: one record instance saved through the engine hooks.

#![allow(dead_code)]

use serde_json::Value;
use vellum_engine::{
    ActorResolver, Attributes, CommitOutcome, OwnerRef, Phase, VersionContext, VersioningEngine,
    VersioningError,
};
use vellum_storage::{MemorySnapshotStore, SnapshotOrder, SnapshotRecord, SnapshotStore};

pub fn attrs(value: Value) -> Attributes {
    serde_json::from_value(value).expect("attribute object")
}

/// A record instance as a host would hold it.
pub struct Record {
    pub owner: OwnerRef,
    pub persisted: Option<Attributes>,
    pub current: Attributes,
    pub ctx: VersionContext,
}

impl Record {
    pub fn new(kind: &str, id: &str, current: Attributes) -> Self {
        Self {
            owner: OwnerRef::new(kind, id),
            persisted: None,
            current,
            ctx: VersionContext::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.current.insert(name.to_string(), value);
    }

    /// Run one save through both hooks.
    pub async fn save<S, A>(
        &mut self,
        engine: &VersioningEngine<S, A>,
    ) -> Result<CommitOutcome, VersioningError>
    where
        S: SnapshotStore,
        A: ActorResolver,
    {
        let (phase, persisted) = match &self.persisted {
            Some(p) => (Phase::Update, p.clone()),
            None => (Phase::Create, Attributes::new()),
        };
        engine.before_persist(
            &mut self.ctx,
            &self.owner.owner_type,
            phase,
            &persisted,
            &self.current,
        )?;
        self.persisted = Some(self.current.clone());
        engine
            .after_persist(&mut self.ctx, &self.owner, &self.current)
            .await
    }
}

pub async fn history(store: &MemorySnapshotStore, owner: &OwnerRef) -> Vec<SnapshotRecord> {
    store
        .list_snapshots(owner, SnapshotOrder::OldestFirst)
        .await
        .expect("history")
}

pub async fn active_count(store: &MemorySnapshotStore, owner: &OwnerRef) -> usize {
    history(store, owner).await.iter().filter(|r| r.active).count()
}
