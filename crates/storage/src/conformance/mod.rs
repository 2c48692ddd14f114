//! Conformance test suite for `SnapshotStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `SnapshotStore` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Transactions**: uncommitted writes invisible, committed writes
//!   visible, aborted and dropped transactions discarded
//! - **History**: ordering, counting, active-flag updates, deletion
//! - **Error handling**: correct error variants for invalid operations
//! - **Concurrency**: owner locks serialize writers, distinct owners do not
//!   block each other
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use vellum_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod history;
mod transaction;

use std::fmt;
use std::future::Future;

use time::{Duration, OffsetDateTime};

use crate::record::{NewSnapshot, OwnerRef};
use crate::SnapshotStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "transaction", "history").
    pub category: String,
    /// Test name (e.g. "committed_insert_visible").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(transaction::run_transaction_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn owner(owner_id: &str) -> OwnerRef {
    OwnerRef::new("article", owner_id)
}

/// A candidate created `seq` seconds after a fixed epoch, so ordering by
/// `created_at` is unambiguous.
fn make_snapshot(owner: &OwnerRef, seq: i64) -> NewSnapshot {
    NewSnapshot {
        owner: owner.clone(),
        schema: "version".to_string(),
        actor_id: Some("tester".to_string()),
        active: false,
        payload: serde_json::json!({ "seq": seq }).to_string(),
        reason: None,
        created_at: base_time() + Duration::seconds(seq),
    }
}

fn base_time() -> OffsetDateTime {
    time::macros::datetime!(2025-01-01 00:00:00 UTC)
}

/// Begin, lock, insert each candidate, commit. Returns the assigned ids.
async fn seed<S: SnapshotStore>(
    storage: &S,
    owner: &OwnerRef,
    snapshots: Vec<NewSnapshot>,
) -> Result<Vec<crate::SnapshotId>, String> {
    let mut tx = storage
        .begin_transaction()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .lock_owner(&mut tx, owner)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let mut ids = Vec::new();
    for snapshot in snapshots {
        ids.push(
            storage
                .insert_snapshot(&mut tx, snapshot)
                .await
                .map_err(|e| format!("insert: {e}"))?,
        );
    }
    storage
        .commit_transaction(tx)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(ids)
}
