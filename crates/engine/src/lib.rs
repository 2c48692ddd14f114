//! vellum record-versioning engine.
//!
//! Hosts call [`VersioningEngine::before_persist`] and
//! [`VersioningEngine::after_persist`] around every save of a versioned
//! record. The engine decides whether the change is worth a snapshot,
//! builds it, reactivates an identical historical snapshot instead of
//! writing a duplicate, keeps exactly one snapshot active per record and
//! trims history to the configured retention count.
//!
//! Storage is pluggable through [`vellum_storage::SnapshotStore`].

pub mod active;
pub mod actor;
pub mod attributes;
pub mod builder;
pub mod config;
pub mod context;
pub mod dedup;
pub mod differ;
pub mod engine;
pub mod error;
pub mod history;
pub mod policy;
pub mod retention;

pub use actor::{ActorResolver, FixedActor, NoActor, ScopedActor};
pub use attributes::{loose_eq, Attributes};
pub use config::{KindRegistry, KindSettings, VersioningConfig};
pub use context::{CycleState, VersionContext};
pub use engine::{CommitOutcome, SkipReason, VersioningEngine};
pub use error::{ConfigError, VersioningError};
pub use history::{FieldChange, Version, VersionDiff};
pub use policy::Phase;
pub use vellum_storage::{OwnerRef, SnapshotId};
