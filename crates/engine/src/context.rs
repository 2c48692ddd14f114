//! Per-record-instance versioning state.
//!
//! A host keeps one [`VersionContext`] next to each record instance it
//! saves and hands it to both lifecycle hooks. The enabled flag lives for
//! the life of the instance; the captured cycle and the pending reason
//! live for one save.

use std::collections::BTreeSet;

use crate::policy::Phase;

/// Where the current save cycle stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CycleState {
    /// No save in flight, or the last one finished.
    #[default]
    Idle,
    /// `before_persist` ran and captured the dirty set against the old state.
    DirtyCaptured {
        kind: String,
        phase: Phase,
        dirty: BTreeSet<String>,
    },
}

#[derive(Debug, Clone)]
pub struct VersionContext {
    enabled: bool,
    pending_reason: Option<String>,
    cycle: CycleState,
}

impl Default for VersionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionContext {
    pub fn new() -> Self {
        Self {
            enabled: true,
            pending_reason: None,
            cycle: CycleState::Idle,
        }
    }

    /// A context whose saves never produce snapshots until re-enabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable versioning for this instance. Any captured cycle is dropped
    /// so stale dirty state cannot leak into a later enabled save.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.cycle = CycleState::Idle;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Annotate the next snapshot. Consumed by the next `after_persist`.
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.pending_reason = Some(reason.into());
    }

    pub fn pending_reason(&self) -> Option<&str> {
        self.pending_reason.as_deref()
    }

    pub fn cycle(&self) -> &CycleState {
        &self.cycle
    }

    pub(crate) fn capture(&mut self, kind: &str, phase: Phase, dirty: BTreeSet<String>) {
        self.cycle = CycleState::DirtyCaptured {
            kind: kind.to_string(),
            phase,
            dirty,
        };
    }

    pub(crate) fn reset_cycle(&mut self) {
        self.cycle = CycleState::Idle;
    }

    pub(crate) fn take_cycle(&mut self) -> CycleState {
        std::mem::take(&mut self.cycle)
    }

    pub(crate) fn reason_slot(&mut self) -> &mut Option<String> {
        &mut self.pending_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_enabled_and_idle() {
        let ctx = VersionContext::new();
        assert!(ctx.is_enabled());
        assert_eq!(ctx.cycle(), &CycleState::Idle);
        assert_eq!(ctx.pending_reason(), None);
    }

    #[test]
    fn disable_drops_captured_cycle() {
        let mut ctx = VersionContext::new();
        ctx.capture("article", Phase::Update, BTreeSet::from(["title".to_string()]));
        ctx.disable();
        assert!(!ctx.is_enabled());
        assert_eq!(ctx.cycle(), &CycleState::Idle);
    }

    #[test]
    fn take_cycle_leaves_idle() {
        let mut ctx = VersionContext::new();
        ctx.capture("article", Phase::Create, BTreeSet::new());
        assert!(matches!(ctx.take_cycle(), CycleState::DirtyCaptured { .. }));
        assert_eq!(ctx.cycle(), &CycleState::Idle);
    }

    #[test]
    fn reason_can_be_replaced_before_commit() {
        let mut ctx = VersionContext::new();
        ctx.set_reason("first");
        ctx.set_reason("second");
        assert_eq!(ctx.pending_reason(), Some("second"));
    }
}
