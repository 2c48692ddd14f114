//! Runs the backend conformance suite against the in-memory store.

use vellum_storage::conformance::run_conformance_suite;
use vellum_storage::MemorySnapshotStore;

#[tokio::test]
async fn memory_store_passes_conformance() {
    let report = run_conformance_suite(|| async { MemorySnapshotStore::new() }).await;
    assert!(report.total > 0, "suite ran no tests");
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_passes_conformance_on_multi_thread_runtime() {
    let report = run_conformance_suite(|| async { MemorySnapshotStore::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
}
