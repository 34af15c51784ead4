//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use hmmnode_lib::worker_node::{
    NodeActivity, PipelineFactory, RequestState, SearchPhase, SearchResults, ShardProvider,
    WorkerNode, is_ranked,
};

/// Longest a test waits for a node to drain before failing.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll until the node stops working and return the final activity.
///
/// # Panics
///
/// Panics if the node is still working after [`DRAIN_TIMEOUT`].
pub fn wait_until_settled<S: ShardProvider, F: PipelineFactory>(
    node: &WorkerNode<S, F>,
) -> NodeActivity {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    loop {
        let activity = node.poll();
        if activity != NodeActivity::Working {
            return activity;
        }
        assert!(Instant::now() < deadline, "node did not drain within {DRAIN_TIMEOUT:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Asserts that a node between searches holds nothing from the last one.
///
/// # Panics
///
/// Panics if the node is not idle, has promoted threads, or has pooled
/// objects checked out.
pub fn assert_node_at_rest<S: ShardProvider, F: PipelineFactory>(node: &WorkerNode<S, F>) {
    assert_eq!(node.phase(), SearchPhase::Idle, "node should be idle");
    assert_eq!(node.backend_threads(), 0, "no thread should stay in back-end mode");
    assert_eq!(node.backend_depth(), 0, "back-end queue should be empty");
    assert_eq!(node.queued_chunks(), 0, "global queue should be empty");
    assert_eq!(node.work_request_state(), RequestState::Idle, "handshake should be reset");
    let pools = node.pool_stats();
    assert_eq!(pools.outstanding(), 0, "pooled objects not returned: {pools:?}");
}

/// Asserts that the hits are ranked and carry exactly `expected_ids`, in order.
///
/// # Panics
///
/// Panics on any difference.
pub fn assert_hit_ids(results: &SearchResults, expected_ids: &[u64]) {
    assert!(is_ranked(&results.hits), "hits are not in ranking order");
    let ids: Vec<u64> = results.hits.iter().map(|hit| hit.record_id).collect();
    assert_eq!(ids, expected_ids, "hit ids differ from expectation");
}

/// Asserts that coverage was tracked and every assigned record was scanned once.
///
/// # Panics
///
/// Panics if coverage was not tracked or is not exact.
pub fn assert_exact_coverage(results: &SearchResults) {
    let coverage = results.coverage.as_ref().expect("coverage tracking should be enabled");
    assert!(coverage.is_exact(), "coverage is not exact: {coverage:?}");
}
