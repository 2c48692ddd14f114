//! Versioning engine: the save-lifecycle orchestrator.
//!
//! One save cycle runs `Idle -> DirtyCaptured -> PolicyEvaluated ->
//! {Skipped | Committed}`. [`VersioningEngine::before_persist`] performs the
//! first transition against the old persisted state; everything else
//! happens in [`VersioningEngine::after_persist`] once the record has been
//! written and its identity is known.
//!
//! A commit runs build, deduplicate, repoint and purge in that order. The
//! last three steps share one store transaction that holds the owner lock,
//! so concurrent saves of the same record are serialized and a failure
//! rolls every step back.

use serde::Serialize;
use time::OffsetDateTime;
use vellum_storage::{NewSnapshot, OwnerRef, SnapshotId, SnapshotOrder, SnapshotStore};

use crate::active;
use crate::actor::{ActorResolver, NoActor};
use crate::attributes::Attributes;
use crate::builder::build_candidate;
use crate::config::{KindRegistry, KindSettings};
use crate::context::{CycleState, VersionContext};
use crate::dedup;
use crate::differ::dirty_attributes;
use crate::error::VersioningError;
use crate::policy::{should_version, Phase};
use crate::retention;

/// Why a save cycle ended without touching the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Versioning is disabled on the instance's context.
    Disabled,
    /// `after_persist` ran without a matching `before_persist`.
    NotCaptured,
    /// The policy found nothing worth a snapshot.
    NotVersionWorthy,
}

/// Result of one `after_persist` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Skipped { reason: SkipReason },
    /// A new snapshot was written and made active.
    Inserted {
        id: SnapshotId,
        purged: Vec<SnapshotId>,
    },
    /// An identical historical snapshot was made active instead.
    Reactivated {
        id: SnapshotId,
        purged: Vec<SnapshotId>,
    },
}

impl CommitOutcome {
    /// The snapshot that is active after the cycle, if one was committed.
    pub fn snapshot_id(&self) -> Option<SnapshotId> {
        match self {
            CommitOutcome::Skipped { .. } => None,
            CommitOutcome::Inserted { id, .. } | CommitOutcome::Reactivated { id, .. } => Some(*id),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CommitOutcome::Skipped { .. })
    }

    /// Snapshots deleted by retention during the commit.
    pub fn purged(&self) -> &[SnapshotId] {
        match self {
            CommitOutcome::Skipped { .. } => &[],
            CommitOutcome::Inserted { purged, .. } | CommitOutcome::Reactivated { purged, .. } => {
                purged
            }
        }
    }
}

/// Orchestrates snapshot creation around a host's record saves.
///
/// The engine itself is stateless between calls; per-instance state lives in
/// the [`VersionContext`] the host passes to each hook, and per-kind
/// settings come from the [`KindRegistry`] given at construction.
pub struct VersioningEngine<S, A = NoActor> {
    store: S,
    actor: A,
    registry: KindRegistry,
}

impl<S: SnapshotStore, A: ActorResolver> VersioningEngine<S, A> {
    pub fn new(store: S, actor: A, registry: KindRegistry) -> Self {
        Self {
            store,
            actor,
            registry,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub(crate) fn settings(&self, kind: &str) -> Result<&KindSettings, VersioningError> {
        self.registry
            .get(kind)
            .ok_or_else(|| VersioningError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    /// Pre-persist hook: capture the dirty set against the old state.
    ///
    /// Must be called before the host overwrites `persisted`. When the
    /// context is disabled the differ is not run and any earlier capture is
    /// dropped.
    pub fn before_persist(
        &self,
        ctx: &mut VersionContext,
        kind: &str,
        phase: Phase,
        persisted: &Attributes,
        current: &Attributes,
    ) -> Result<(), VersioningError> {
        if !ctx.is_enabled() {
            ctx.reset_cycle();
            tracing::debug!(kind = %kind, "versioning disabled; skipping capture");
            return Ok(());
        }
        if let Err(e) = self.settings(kind) {
            ctx.reset_cycle();
            return Err(e);
        }
        let dirty = dirty_attributes(persisted, current);
        tracing::debug!(kind = %kind, ?phase, dirty = dirty.len(), "captured dirty attributes");
        ctx.capture(kind, phase, dirty);
        Ok(())
    }

    /// Post-persist hook: evaluate the policy and commit a snapshot.
    ///
    /// `owner` is the saved record's identity and `current` its attributes
    /// as written. The context's pending reason is cleared when this
    /// returns, whatever the outcome.
    pub async fn after_persist(
        &self,
        ctx: &mut VersionContext,
        owner: &OwnerRef,
        current: &Attributes,
    ) -> Result<CommitOutcome, VersioningError> {
        let result = self.run_cycle(ctx, owner, current).await;
        ctx.reason_slot().take();
        result
    }

    async fn run_cycle(
        &self,
        ctx: &mut VersionContext,
        owner: &OwnerRef,
        current: &Attributes,
    ) -> Result<CommitOutcome, VersioningError> {
        let cycle = ctx.take_cycle();
        if !ctx.is_enabled() {
            return Ok(CommitOutcome::Skipped {
                reason: SkipReason::Disabled,
            });
        }
        let (kind, phase, dirty) = match cycle {
            CycleState::Idle => {
                tracing::debug!(owner = %owner, "no captured cycle; skipping");
                return Ok(CommitOutcome::Skipped {
                    reason: SkipReason::NotCaptured,
                });
            }
            CycleState::DirtyCaptured { kind, phase, dirty } => (kind, phase, dirty),
        };
        if kind != owner.owner_type {
            return Err(VersioningError::KindMismatch {
                captured: kind,
                owner: owner.clone(),
            });
        }
        let settings = self.settings(&kind)?;
        if !should_version(&dirty, phase, &settings.tracked, &settings.excluded) {
            tracing::debug!(owner = %owner, ?phase, "change is not version-worthy");
            return Ok(CommitOutcome::Skipped {
                reason: SkipReason::NotVersionWorthy,
            });
        }

        let candidate = build_candidate(
            owner,
            &settings.schema,
            current,
            self.actor.current_actor_id(),
            ctx.reason_slot(),
            OffsetDateTime::now_utc(),
        )?;
        self.commit(settings, candidate, current).await
    }

    async fn commit(
        &self,
        settings: &KindSettings,
        candidate: NewSnapshot,
        current: &Attributes,
    ) -> Result<CommitOutcome, VersioningError> {
        let owner = candidate.owner.clone();
        let mut tx = self.store.begin_transaction().await?;
        let outcome = match self.commit_in(&mut tx, settings, candidate, current).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = self.store.abort_transaction(tx).await;
                tracing::warn!(owner = %owner, error = %e, "snapshot commit aborted");
                return Err(e);
            }
        };
        self.store.commit_transaction(tx).await?;

        match &outcome {
            CommitOutcome::Inserted { id, purged } => {
                tracing::info!(owner = %owner, id = %id, purged = purged.len(), "snapshot inserted");
            }
            CommitOutcome::Reactivated { id, purged } => {
                tracing::info!(owner = %owner, id = %id, purged = purged.len(), "snapshot reactivated");
            }
            CommitOutcome::Skipped { .. } => {}
        }
        Ok(outcome)
    }

    async fn commit_in(
        &self,
        tx: &mut S::Transaction,
        settings: &KindSettings,
        mut candidate: NewSnapshot,
        current: &Attributes,
    ) -> Result<CommitOutcome, VersioningError> {
        let owner = candidate.owner.clone();
        self.store.lock_owner(tx, &owner).await?;
        let history = self
            .store
            .list_by_owner(tx, &owner, SnapshotOrder::OldestFirst)
            .await?;
        // Stamped under the owner lock so commit order is creation order.
        let now = OffsetDateTime::now_utc();
        candidate.created_at = history
            .last()
            .map_or(now, |newest| newest.created_at.max(now));

        let matched = dedup::find_match(current, &history, &settings.versionable)?.map(|r| r.id);
        let (id, reactivated) = match matched {
            Some(id) => {
                active::activate_only(&self.store, tx, &history, id).await?;
                (id, true)
            }
            None => {
                active::deactivate_all(&self.store, tx, &history).await?;
                (self.store.insert_snapshot(tx, candidate).await?, false)
            }
        };

        let purged = retention::purge(&self.store, tx, &owner, settings.keep).await?;
        Ok(if reactivated {
            CommitOutcome::Reactivated { id, purged }
        } else {
            CommitOutcome::Inserted { id, purged }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vellum_storage::MemorySnapshotStore;

    use crate::actor::FixedActor;

    fn attrs(value: serde_json::Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    fn engine() -> VersioningEngine<MemorySnapshotStore, FixedActor> {
        let registry =
            KindRegistry::new().with(KindSettings::new("article").versionable(["title"]));
        VersioningEngine::new(
            MemorySnapshotStore::new(),
            FixedActor::new("alice"),
            registry,
        )
    }

    #[test]
    fn unknown_kind_fails_at_capture() {
        let engine = engine();
        let mut ctx = VersionContext::new();
        let err = engine
            .before_persist(
                &mut ctx,
                "comment",
                Phase::Create,
                &Attributes::new(),
                &attrs(json!({"text": "hi"})),
            )
            .unwrap_err();
        assert!(matches!(err, VersioningError::UnknownKind { .. }));
        assert_eq!(ctx.cycle(), &CycleState::Idle);
    }

    #[tokio::test]
    async fn unknown_kind_drops_earlier_capture() {
        let engine = engine();
        let owner = OwnerRef::new("article", "1");
        let mut ctx = VersionContext::new();
        let current = attrs(json!({"title": "a"}));
        engine
            .before_persist(&mut ctx, "article", Phase::Create, &Attributes::new(), &current)
            .unwrap();

        let err = engine
            .before_persist(&mut ctx, "comment", Phase::Create, &Attributes::new(), &current)
            .unwrap_err();
        assert!(matches!(err, VersioningError::UnknownKind { .. }));
        assert_eq!(ctx.cycle(), &CycleState::Idle);

        let outcome = engine
            .after_persist(&mut ctx, &owner, &current)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Skipped {
                reason: SkipReason::NotCaptured
            }
        );
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn created_at_never_goes_backwards() {
        let engine = engine();
        let owner = OwnerRef::new("article", "1");
        let mut ctx = VersionContext::new();

        let mut previous = Attributes::new();
        for (phase, title) in [(Phase::Create, "a"), (Phase::Update, "b"), (Phase::Update, "c")] {
            let current = attrs(json!({ "title": title }));
            engine
                .before_persist(&mut ctx, "article", phase, &previous, &current)
                .unwrap();
            engine.after_persist(&mut ctx, &owner, &current).await.unwrap();
            previous = current;
        }

        let rows = engine
            .store()
            .list_snapshots(&owner, SnapshotOrder::OldestFirst)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(rows[2].active);
    }

    #[test]
    fn disabled_context_skips_the_differ() {
        let engine = engine();
        let mut ctx = VersionContext::disabled();
        engine
            .before_persist(
                &mut ctx,
                "article",
                Phase::Create,
                &Attributes::new(),
                &attrs(json!({"title": "a"})),
            )
            .unwrap();
        assert_eq!(ctx.cycle(), &CycleState::Idle);
    }

    #[tokio::test]
    async fn after_persist_without_capture_is_skipped() {
        let engine = engine();
        let mut ctx = VersionContext::new();
        ctx.set_reason("orphan");
        let outcome = engine
            .after_persist(
                &mut ctx,
                &OwnerRef::new("article", "1"),
                &attrs(json!({"title": "a"})),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Skipped {
                reason: SkipReason::NotCaptured
            }
        );
        assert_eq!(ctx.pending_reason(), None);
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let engine = engine();
        let mut ctx = VersionContext::new();
        let current = attrs(json!({"title": "a"}));
        engine
            .before_persist(&mut ctx, "article", Phase::Create, &Attributes::new(), &current)
            .unwrap();
        let err = engine
            .after_persist(&mut ctx, &OwnerRef::new("comment", "1"), &current)
            .await
            .unwrap_err();
        assert!(matches!(err, VersioningError::KindMismatch { .. }));
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn commit_records_actor_schema_and_reason() {
        let engine = engine();
        let owner = OwnerRef::new("article", "1");
        let mut ctx = VersionContext::new();
        let current = attrs(json!({"title": "a"}));
        ctx.set_reason("initial import");
        engine
            .before_persist(&mut ctx, "article", Phase::Create, &Attributes::new(), &current)
            .unwrap();
        let outcome = engine
            .after_persist(&mut ctx, &owner, &current)
            .await
            .unwrap();

        let id = outcome.snapshot_id().unwrap();
        let stored = engine.store().get_snapshot(id).await.unwrap();
        assert!(stored.active);
        assert_eq!(stored.actor_id.as_deref(), Some("alice"));
        assert_eq!(stored.schema, "version");
        assert_eq!(stored.reason.as_deref(), Some("initial import"));
        assert!(outcome.purged().is_empty());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = CommitOutcome::Inserted {
            id: SnapshotId(3),
            purged: vec![SnapshotId(1)],
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"outcome": "inserted", "id": 3, "purged": [1]})
        );
        let skipped = CommitOutcome::Skipped {
            reason: SkipReason::NotVersionWorthy,
        };
        assert_eq!(
            serde_json::to_value(&skipped).unwrap(),
            json!({"outcome": "skipped", "reason": "not_version_worthy"})
        );
    }
}
