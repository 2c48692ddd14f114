//! Versioning policy: is a change worth a snapshot?

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the save being versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Create,
    Update,
}

impl Phase {
    pub fn is_update(self) -> bool {
        self == Phase::Update
    }
}

/// Decide whether a save with the given dirty attributes gets a snapshot.
///
/// - Create: any dirty attribute at all.
/// - Update: after dropping `excluded` (deny-list plus timestamp fields), at
///   least one dirty attribute must be tracked. An empty `tracked` set
///   tracks every attribute.
///
/// The per-instance disabled flag is checked by the engine before the
/// differ runs, so it never reaches this function.
pub fn should_version(
    dirty: &BTreeSet<String>,
    phase: Phase,
    tracked: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> bool {
    if !phase.is_update() {
        return !dirty.is_empty();
    }
    dirty
        .iter()
        .filter(|name| !excluded.contains(*name))
        .any(|name| tracked.is_empty() || tracked.contains(name))
}
