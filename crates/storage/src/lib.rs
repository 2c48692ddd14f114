//! Snapshot storage contract for the vellum versioning engine.
//!
//! The engine never talks to a database directly. It drives any backend
//! that implements [`SnapshotStore`]; [`MemorySnapshotStore`] is the
//! reference implementation and [`conformance`] checks the others.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshotStore, MemoryTransaction};
pub use record::{
    NewSnapshot, OwnerRef, SnapshotId, SnapshotOrder, SnapshotRecord, DEFAULT_SCHEMA,
};
pub use traits::SnapshotStore;
