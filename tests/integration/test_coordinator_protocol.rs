//! Tests of the coordinator message protocol, driven through
//! [`ScriptedCoordinator`] over real channels.

use std::sync::Arc;
use std::time::Duration;

use hmmnode_lib::NodeError;
use hmmnode_lib::simulate::{ScriptedCoordinator, SearchScript};
use hmmnode_lib::worker_node::{
    CoordinatorMessage, InMemoryShard, NodeConfig, NodeMessage, RecordRange, SearchKind,
    ShardInfo, WorkerNode,
};

use crate::helpers::{ModuloPipeline, assert_exact_coverage, assert_hit_ids, id_shard};

fn coordinator_for(
    pipeline: &ModuloPipeline,
    records: u64,
    config: NodeConfig,
) -> ScriptedCoordinator {
    let mut node: WorkerNode<InMemoryShard, ModuloPipeline> =
        WorkerNode::setup(1, id_shard(1, records), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();
    ScriptedCoordinator::spawn(node).unwrap()
}

fn script(kind: SearchKind, range: RecordRange, macro_chunk: u64) -> SearchScript {
    SearchScript { database: 0, kind, query: Arc::from(b"query".to_vec()), range, macro_chunk }
}

/// Receive until a message other than a work request arrives.
fn next_outcome(coordinator: &ScriptedCoordinator) -> NodeMessage {
    loop {
        match coordinator.recv().unwrap() {
            NodeMessage::WorkRequest => coordinator.send(CoordinatorMessage::NoMoreWork).unwrap(),
            other => return other,
        }
    }
}

#[test]
fn test_search_pulls_macro_chunks_on_request() {
    let pipeline = ModuloPipeline::new(1, 9);
    let config = NodeConfig::new(4)
        .with_chunk_size(100)
        .with_work_request_threshold(2)
        .with_coverage_tracking(true);
    let mut coordinator = coordinator_for(&pipeline, 10_000, config);

    let range = RecordRange::new(0, 9_999);
    let results = coordinator.run_search(&script(SearchKind::Sequence, range, 1_000)).unwrap();

    assert_eq!(results.records_processed, 10_000);
    assert_exact_coverage(&results);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    // Nine more macro-chunks, then one request answered with NoMoreWork.
    assert!(coordinator.work_requests() >= 10, "only {} requests", coordinator.work_requests());
    coordinator.shutdown().unwrap();
}

#[test]
fn test_consecutive_searches_over_one_connection() {
    let pipeline = ModuloPipeline::new(2, 2);
    let config = NodeConfig::new(3).with_chunk_size(64);
    let mut coordinator = coordinator_for(&pipeline, 3_000, config);

    let kinds = [SearchKind::Sequence, SearchKind::Hmm, SearchKind::Sequence];
    for (i, kind) in kinds.into_iter().enumerate() {
        let range = RecordRange::new(i as u64 * 100, 2_999);
        let results = coordinator.run_search(&script(kind, range, 700)).unwrap();
        assert_eq!(results.kind, kind);
        assert_eq!(results.records_processed, range.len());
        assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    }
    coordinator.shutdown().unwrap();
}

#[test]
fn test_add_work_while_idle_is_reported_not_fatal() {
    let pipeline = ModuloPipeline::new(1, 1);
    let mut coordinator = coordinator_for(&pipeline, 100, NodeConfig::new(2));

    coordinator.send(CoordinatorMessage::AddWorkChunk { range: RecordRange::new(0, 9) }).unwrap();
    match coordinator.recv().unwrap() {
        NodeMessage::SearchAborted { reason } => {
            assert!(matches!(reason, NodeError::ProtocolViolation { operation: "AddWork", .. }));
        }
        other => panic!("expected SearchAborted, got {other:?}"),
    }

    coordinator.send(CoordinatorMessage::EndSearch).unwrap();
    match coordinator.recv().unwrap() {
        NodeMessage::SearchAborted { reason } => {
            assert!(matches!(reason, NodeError::ProtocolViolation { operation: "EndSearch", .. }));
        }
        other => panic!("expected SearchAborted, got {other:?}"),
    }

    // Stray NoMoreWork while idle is ignored.
    coordinator.send(CoordinatorMessage::NoMoreWork).unwrap();

    let results =
        coordinator.run_search(&script(SearchKind::Sequence, RecordRange::new(0, 99), 50)).unwrap();
    assert_eq!(results.records_processed, 100);
    coordinator.shutdown().unwrap();
}

#[test]
fn test_bad_start_range_aborts_search() {
    let pipeline = ModuloPipeline::new(1, 1);
    let mut coordinator = coordinator_for(&pipeline, 100, NodeConfig::new(2));

    let err = coordinator
        .run_search(&script(SearchKind::Hmm, RecordRange::new(50, 149), 100))
        .unwrap_err();
    assert_eq!(err, NodeError::InvalidRange { start: 50, end: 149, records: 100 });

    let results =
        coordinator.run_search(&script(SearchKind::Hmm, RecordRange::new(50, 99), 100)).unwrap();
    assert_eq!(results.records_processed, 50);
    coordinator.shutdown().unwrap();
}

#[test]
fn test_end_search_stops_early() {
    let pipeline = ModuloPipeline::new(1, 1).with_frontend_delay(Duration::from_micros(200));
    let coordinator = coordinator_for(&pipeline, 5_000, NodeConfig::new(2).with_chunk_size(50));

    coordinator
        .send(CoordinatorMessage::StartSearch {
            database: 0,
            range: RecordRange::new(0, 4_999),
            query: Arc::from(b"q".to_vec()),
            kind: SearchKind::Sequence,
        })
        .unwrap();
    coordinator.send(CoordinatorMessage::EndSearch).unwrap();
    match next_outcome(&coordinator) {
        NodeMessage::SearchComplete(results) => assert!(results.records_processed < 5_000),
        other => panic!("expected SearchComplete, got {other:?}"),
    }
    coordinator.shutdown().unwrap();
}

#[test]
fn test_worker_panic_is_fatal() {
    let pipeline = ModuloPipeline::new(1, 1).with_panic_on(500);
    let config = NodeConfig::new(3).with_chunk_size(100);
    let mut coordinator = coordinator_for(&pipeline, 1_000, config);

    let err = coordinator
        .run_search(&script(SearchKind::Sequence, RecordRange::new(0, 999), 1_000))
        .unwrap_err();
    assert_eq!(err, NodeError::ShutDown);

    match coordinator.shutdown().unwrap_err() {
        NodeError::WorkerPanicked { message, .. } => {
            assert!(message.contains("scoring exploded on 500"), "message was {message}");
        }
        other => panic!("expected WorkerPanicked, got {other:?}"),
    }
}

#[test]
fn test_dropping_coordinator_stops_node() {
    let pipeline = ModuloPipeline::new(1, 1);
    {
        let mut coordinator = coordinator_for(&pipeline, 200, NodeConfig::new(2));
        let range = RecordRange::new(0, 199);
        coordinator.run_search(&script(SearchKind::Sequence, range, 100)).unwrap();
    }
    assert_eq!(Arc::strong_count(&pipeline.counters), 1);
}
