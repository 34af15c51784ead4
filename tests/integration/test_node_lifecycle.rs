//! Lifecycle tests for a worker node driven directly through its API.

use std::sync::atomic::Ordering;
use std::time::Duration;

use hmmnode_lib::NodeError;
use hmmnode_lib::worker_node::{
    InMemoryShard, NodeActivity, NodeConfig, RecordRange, SearchKind, SearchPhase, ShardInfo,
    WorkerNode,
};

use crate::helpers::{
    GappyShard, ModuloPipeline, assert_exact_coverage, assert_hit_ids, assert_node_at_rest,
    id_shard, wait_until_settled,
};

fn started_node(
    threads: usize,
    chunk_size: u64,
    records: u64,
    pipeline: ModuloPipeline,
) -> WorkerNode<InMemoryShard, ModuloPipeline> {
    let config =
        NodeConfig::new(threads).with_chunk_size(chunk_size).with_coverage_tracking(true);
    let mut node =
        WorkerNode::setup(2, id_shard(2, records), ShardInfo::default(), config, pipeline)
            .unwrap();
    node.create_threads().unwrap();
    node
}

#[test]
fn test_single_search_scans_every_record_once() {
    let pipeline = ModuloPipeline::new(3, 2);
    let mut node = started_node(4, 100, 1_000, pipeline.clone());
    let range = RecordRange::new(0, 999);

    node.start_range_vs_model(0, range, b"query".to_vec()).unwrap();
    assert_eq!(node.phase(), SearchPhase::SequenceSearch);
    assert_eq!(wait_until_settled(&node), NodeActivity::Drained);
    let results = node.end_search().unwrap();

    assert_eq!(results.kind, SearchKind::Sequence);
    assert_eq!(results.records_processed, 1_000);
    assert_eq!(results.comparisons_queued, 334);
    assert_exact_coverage(&results);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    assert_eq!(pipeline.counters.mismatches.load(Ordering::Relaxed), 0);
    let per_thread: u64 = results.thread_stats.iter().map(|s| s.records_filtered).sum();
    assert_eq!(per_thread, 1_000);
    assert_node_at_rest(&node);
    node.destroy().unwrap();
}

#[test]
fn test_model_vs_range_search() {
    let pipeline = ModuloPipeline::new(1, 5);
    let mut node = started_node(3, 64, 500, pipeline.clone());
    let range = RecordRange::new(100, 399);

    node.start_model_vs_range(1, range, b"SEQ".to_vec()).unwrap();
    assert_eq!(node.phase(), SearchPhase::HmmSearch);
    wait_until_settled(&node);
    let results = node.end_search().unwrap();

    assert_eq!(results.kind, SearchKind::Hmm);
    assert_eq!(results.database, 1);
    assert_eq!(results.records_processed, 300);
    assert_exact_coverage(&results);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    assert_node_at_rest(&node);
}

#[test]
fn test_every_thread_sets_up_once_per_search() {
    let pipeline = ModuloPipeline::new(2, 2);
    let mut node = started_node(4, 50, 400, pipeline.clone());

    for search in 0..5_u64 {
        let range = RecordRange::new(search * 10, 399);
        node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
        wait_until_settled(&node);
        // A later chunk must not trigger a second setup.
        node.add_work(RecordRange::new(0, search * 10)).unwrap();
        wait_until_settled(&node);
        let results = node.end_search().unwrap();
        assert_eq!(results.records_processed, 400 + 1);
    }
    assert_eq!(pipeline.counters.setups.load(Ordering::SeqCst), 4 * 5);
}

#[test]
fn test_add_work_extends_running_search() {
    let pipeline = ModuloPipeline::new(1, 7);
    let mut node = started_node(4, 25, 1_000, pipeline.clone());
    let first = RecordRange::new(0, 299);
    let second = RecordRange::new(300, 599);
    let third = RecordRange::new(900, 999);

    node.start_range_vs_model(0, first, b"q".to_vec()).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Drained);
    node.add_work(second).unwrap();
    assert_eq!(node.phase(), SearchPhase::SequenceSearchContinue);
    node.add_work(third).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Drained);
    let results = node.end_search().unwrap();

    assert_eq!(results.records_processed, 700);
    assert_exact_coverage(&results);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[first, second, third]));
    assert_node_at_rest(&node);
}

#[test]
fn test_empty_first_chunk_waits_for_work() {
    let pipeline = ModuloPipeline::new(1, 1);
    let mut node = started_node(2, 10, 100, pipeline.clone());

    node.start_range_vs_model(0, RecordRange::EMPTY, b"q".to_vec()).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Drained);
    assert!(node.raise_work_request());
    assert!(node.take_work_request());
    assert!(!node.take_work_request());

    node.add_work(RecordRange::new(0, 49)).unwrap();
    wait_until_settled(&node);
    let results = node.end_search().unwrap();
    assert_eq!(results.records_processed, 50);
    assert_eq!(results.hit_count(), 50);
}

#[test]
fn test_sequential_searches_reuse_threads() {
    let pipeline = ModuloPipeline::new(2, 3);
    let mut node = started_node(4, 37, 2_000, pipeline.clone());

    for i in 0..20_u64 {
        let range = RecordRange::new(i * 50, i * 50 + 999);
        if i % 2 == 0 {
            node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
        } else {
            node.start_model_vs_range(1, range, b"q".to_vec()).unwrap();
        }
        wait_until_settled(&node);
        let results = node.end_search().unwrap();
        assert_eq!(results.records_processed, 1_000, "search {i}");
        assert_exact_coverage(&results);
        assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
        assert_node_at_rest(&node);
    }
    node.destroy().unwrap();
}

#[test]
fn test_end_search_discards_unfinished_work() {
    let pipeline = ModuloPipeline::new(1, 1).with_frontend_delay(Duration::from_micros(200));
    let mut node = started_node(2, 10, 1_000, pipeline);

    node.start_range_vs_model(0, RecordRange::new(0, 999), b"q".to_vec()).unwrap();
    let results = node.end_search().unwrap();
    assert!(results.records_processed < 1_000);
    assert_node_at_rest(&node);

    // The node still searches normally afterwards.
    node.start_range_vs_model(0, RecordRange::new(0, 9), b"q".to_vec()).unwrap();
    wait_until_settled(&node);
    assert_eq!(node.end_search().unwrap().records_processed, 10);
}

#[test]
fn test_protocol_violations_are_rejected() {
    let mut node = started_node(2, 10, 100, ModuloPipeline::new(1, 1));

    let err = node.end_search().unwrap_err();
    assert!(matches!(err, NodeError::ProtocolViolation { operation: "EndSearch", .. }));
    let err = node.add_work(RecordRange::new(0, 9)).unwrap_err();
    assert!(matches!(err, NodeError::ProtocolViolation { operation: "AddWork", .. }));
    let err = node.create_threads().unwrap_err();
    assert!(matches!(err, NodeError::ProtocolViolation { operation: "CreateThreads", .. }));

    node.start_range_vs_model(0, RecordRange::new(0, 9), b"q".to_vec()).unwrap();
    let err = node.start_model_vs_range(0, RecordRange::new(0, 9), b"q".to_vec()).unwrap_err();
    assert!(matches!(err, NodeError::ProtocolViolation { operation: "StartSearch", .. }));
    wait_until_settled(&node);
    assert_eq!(node.end_search().unwrap().records_processed, 10);
}

#[test]
fn test_bad_ranges_and_databases_are_rejected() {
    let mut node = started_node(2, 10, 100, ModuloPipeline::new(1, 1));

    let err = node.start_range_vs_model(5, RecordRange::new(0, 9), b"q".to_vec()).unwrap_err();
    assert_eq!(err, NodeError::UnknownDatabase { database: 5, available: 2 });
    let err = node.start_range_vs_model(0, RecordRange::new(90, 100), b"q".to_vec()).unwrap_err();
    assert_eq!(err, NodeError::InvalidRange { start: 90, end: 100, records: 100 });
    assert_eq!(node.phase(), SearchPhase::Idle);
}

#[test]
fn test_setup_rejects_bad_configuration() {
    let shard = id_shard(1, 10);
    let pipeline = ModuloPipeline::new(1, 1);

    let err = WorkerNode::setup(
        1,
        shard.clone(),
        ShardInfo::default(),
        NodeConfig::new(2).with_chunk_size(0),
        pipeline.clone(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, NodeError::InvalidParameter { .. }));

    let err = WorkerNode::setup(
        3,
        shard.clone(),
        ShardInfo::default(),
        NodeConfig::new(2),
        pipeline.clone(),
    )
    .err()
    .unwrap();
    assert_eq!(err, NodeError::DatabaseMismatch { expected: 3, actual: 1 });

    let err = WorkerNode::setup(
        1,
        shard,
        ShardInfo { num_shards: 2, my_shard: 2 },
        NodeConfig::new(2),
        pipeline,
    )
    .err()
    .unwrap();
    assert!(matches!(err, NodeError::InvalidParameter { .. }));
}

#[test]
fn test_start_requires_threads() {
    let mut node = WorkerNode::setup(
        1,
        id_shard(1, 10),
        ShardInfo::default(),
        NodeConfig::new(2),
        ModuloPipeline::new(1, 1),
    )
    .unwrap();
    let err = node.start_range_vs_model(0, RecordRange::new(0, 9), b"q".to_vec()).unwrap_err();
    assert!(matches!(err, NodeError::ProtocolViolation { .. }));
    node.destroy().unwrap();
}

#[test]
fn test_missing_record_fails_search_but_not_node() {
    let config = NodeConfig::new(3).with_chunk_size(16);
    let mut node = WorkerNode::setup(
        1,
        GappyShard::new(200, 77),
        ShardInfo::default(),
        config,
        ModuloPipeline::new(1, 1),
    )
    .unwrap();
    node.create_threads().unwrap();

    node.start_range_vs_model(0, RecordRange::new(0, 199), b"q".to_vec()).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Failed);
    let err = node.end_search().unwrap_err();
    assert_eq!(err, NodeError::InvalidRange { start: 77, end: 77, records: 200 });
    assert_node_at_rest(&node);

    node.start_range_vs_model(0, RecordRange::new(100, 199), b"q".to_vec()).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Drained);
    assert_eq!(node.end_search().unwrap().records_processed, 100);
    node.destroy().unwrap();
}

#[test]
fn test_abort_search_returns_node_to_idle() {
    let mut node = started_node(2, 10, 100, ModuloPipeline::new(1, 1));
    assert!(!node.abort_search(NodeError::ShutDown).unwrap());

    node.start_range_vs_model(0, RecordRange::new(0, 99), b"q".to_vec()).unwrap();
    assert!(
        node.abort_search(NodeError::ProtocolViolation {
            operation: "AddWork",
            phase: "test".to_string(),
        })
        .unwrap()
    );
    assert_node_at_rest(&node);
}

#[test]
fn test_abort_search_reports_dead_worker() {
    let pipeline = ModuloPipeline::new(1, 1).with_panic_on(500);
    let mut node = started_node(3, 100, 1_000, pipeline);

    node.start_range_vs_model(0, RecordRange::new(0, 999), b"q".to_vec()).unwrap();
    assert_eq!(wait_until_settled(&node), NodeActivity::Failed);
    let err = node
        .abort_search(NodeError::ProtocolViolation {
            operation: "StartSearch",
            phase: node.phase().to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, NodeError::WorkerPanicked { .. }), "got {err:?}");
    assert_eq!(node.phase(), SearchPhase::Idle);
    assert!(matches!(node.destroy().unwrap_err(), NodeError::WorkerPanicked { .. }));
}
