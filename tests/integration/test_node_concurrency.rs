//! Concurrency tests for a running worker node.
//!
//! # Test categories
//!
//! - **Quick concurrency tests**: always run.
//! - **Stress tests**: behind `#[cfg(feature = "stress-tests")]`, run with
//!   `cargo test --features stress-tests`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hmmnode_lib::worker_node::{
    NodeActivity, NodeConfig, RecordRange, ShardInfo, StartBarrier, WorkerNode, lock_order,
};
use rand::{RngExt, SeedableRng};

use crate::helpers::{
    ModuloPipeline, assert_exact_coverage, assert_hit_ids, assert_node_at_rest, id_shard,
    wait_until_settled,
};

// ============================================================================
// Work distribution
// ============================================================================

#[test]
fn test_four_threads_cover_range_exactly_once() {
    let pipeline = ModuloPipeline::new(1, 10);
    let config = NodeConfig::new(4).with_chunk_size(100).with_coverage_tracking(true);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 1_000), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();

    let range = RecordRange::new(0, 999);
    node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
    wait_until_settled(&node);
    let results = node.end_search().unwrap();

    assert_exact_coverage(&results);
    assert_eq!(results.records_processed, 1_000);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    assert_eq!(results.hit_count(), 100);
    let chunks: u64 = results.thread_stats.iter().map(|s| s.chunks_taken).sum();
    assert!(chunks <= 10, "only ten chunks were queued, {chunks} taken");
    assert_eq!(lock_order::violations(), 0);
    node.destroy().unwrap();
}

// ============================================================================
// Front-end / back-end mode switching
// ============================================================================

#[test]
fn test_backend_pressure_promotes_and_demotes_threads() {
    let pipeline = ModuloPipeline::new(1, 4).with_backend_delay(Duration::from_micros(200));
    let config = NodeConfig::new(4)
        .with_chunk_size(50)
        .with_backend_water_marks(2, 0)
        .with_backend_thread_bounds(0, 2)
        .with_coverage_tracking(true);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 2_000), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();

    let range = RecordRange::new(0, 1_999);
    node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut most_backend = 0;
    while node.poll() == NodeActivity::Working {
        most_backend = most_backend.max(node.backend_threads());
        assert!(Instant::now() < deadline, "search did not finish");
        std::thread::sleep(Duration::from_micros(100));
    }
    let results = node.end_search().unwrap();

    assert!(most_backend <= 2, "saw {most_backend} back-end threads with a cap of 2");
    let promotions: u64 = results.thread_stats.iter().map(|s| s.promotions).sum();
    let demotions: u64 = results.thread_stats.iter().map(|s| s.demotions).sum();
    assert!(promotions > 0, "a deep back-end queue should promote a thread");
    assert_eq!(promotions, demotions);
    assert!(results.backend_peak_depth > 2);

    let scored: u64 = results.thread_stats.iter().map(|s| s.backend_scored).sum();
    assert_eq!(scored, 2_000);
    assert_eq!(results.comparisons_queued, 2_000);
    assert_eq!(pipeline.counters.mismatches.load(Ordering::Relaxed), 0);
    assert_exact_coverage(&results);
    assert_hit_ids(&results, &pipeline.expected_hit_ids(&[range]));
    assert_node_at_rest(&node);
}

#[test]
fn test_single_thread_node_never_promotes() {
    let pipeline = ModuloPipeline::new(1, 3);
    let config = NodeConfig::new(1).with_chunk_size(10).with_backend_water_marks(1, 0);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 300), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();

    node.start_range_vs_model(0, RecordRange::new(0, 299), b"q".to_vec()).unwrap();
    wait_until_settled(&node);
    let results = node.end_search().unwrap();
    assert_eq!(results.thread_stats[0].promotions, 0);
    assert_eq!(results.thread_stats[0].backend_scored, 300);
    assert_eq!(results.hit_count(), 100);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_destroy_interrupts_running_search() {
    let pipeline = ModuloPipeline::new(1, 1).with_frontend_delay(Duration::from_micros(100));
    let config = NodeConfig::new(4).with_chunk_size(100);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 100_000), ShardInfo::default(), config, pipeline)
            .unwrap();
    node.create_threads().unwrap();
    node.start_range_vs_model(0, RecordRange::new(0, 99_999), b"q".to_vec()).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    node.destroy().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10), "shutdown took {:?}", started.elapsed());
}

#[test]
fn test_dropping_node_joins_threads() {
    let pipeline = ModuloPipeline::new(1, 1).with_frontend_delay(Duration::from_micros(50));
    {
        let config = NodeConfig::new(3).with_chunk_size(10);
        let shard = id_shard(1, 10_000);
        let mut node =
            WorkerNode::setup(1, shard, ShardInfo::default(), config, pipeline.clone()).unwrap();
        node.create_threads().unwrap();
        node.start_model_vs_range(0, RecordRange::new(0, 9_999), b"q".to_vec()).unwrap();
    }
    // Every stage clone is dropped once the threads are joined.
    assert_eq!(Arc::strong_count(&pipeline.counters), 1);
}

// ============================================================================
// Pools
// ============================================================================

#[test]
fn test_pools_return_to_rest_across_searches() {
    let pipeline = ModuloPipeline::new(2, 3);
    let config = NodeConfig::new(4).with_chunk_size(100).with_backend_water_marks(8, 0);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 5_000), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for cycle in 0..100 {
        let start = rng.random_range(0..4_000_u64);
        let range = RecordRange::new(start, start + 999);
        node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
        wait_until_settled(&node);
        let results = node.end_search().unwrap();
        assert_eq!(results.records_processed, 1_000, "cycle {cycle}");
        assert_node_at_rest(&node);
    }

    let pools = node.pool_stats();
    assert!(pools.chunks.allocated <= 10, "chunk pool grew to {}", pools.chunks.allocated);
    assert!(pools.backend.allocated <= 500, "entry pool grew to {}", pools.backend.allocated);
    let hit_bound = 1_000 + 4 * node.config().hit_batch_size;
    assert!(pools.hits.allocated <= hit_bound, "hit pool grew to {}", pools.hits.allocated);
    assert_eq!(lock_order::violations(), 0);
}

// ============================================================================
// Stress
// ============================================================================

#[cfg(feature = "stress-tests")]
#[test]
fn stress_barrier_wakes_each_thread_once_per_release() {
    const THREADS: usize = 8;
    const CYCLES: u64 = 1_000;
    let barrier = Arc::new(StartBarrier::new(THREADS));
    let wakeups = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let wakeups = Arc::clone(&wakeups);
            std::thread::spawn(move || {
                for _ in 0..CYCLES {
                    barrier.wait();
                    wakeups.fetch_add(1, Ordering::SeqCst);
                }
                barrier.retire();
            })
        })
        .collect();
    for cycle in 1..=CYCLES {
        assert_eq!(barrier.release(), cycle);
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(wakeups.load(Ordering::SeqCst), THREADS as u64 * CYCLES);
}

#[test]
fn test_barrier_release_counts_generations() {
    let barrier = Arc::new(StartBarrier::new(2));
    let wakeups = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let wakeups = Arc::clone(&wakeups);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    barrier.wait();
                    wakeups.fetch_add(1, Ordering::SeqCst);
                }
                barrier.retire();
            })
        })
        .collect();
    for _ in 0..50 {
        barrier.release();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(barrier.generation(), 50);
    assert_eq!(wakeups.load(Ordering::SeqCst), 100);
}

#[cfg(feature = "stress-tests")]
#[test]
fn stress_thousand_tiny_searches() {
    let pipeline = ModuloPipeline::new(1, 2);
    let config = NodeConfig::new(8).with_chunk_size(3).with_coverage_tracking(true);
    let mut node =
        WorkerNode::setup(1, id_shard(1, 1_000), ShardInfo::default(), config, pipeline.clone())
            .unwrap();
    node.create_threads().unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    for cycle in 0..1_000 {
        let start = rng.random_range(0..990_u64);
        let range = RecordRange::new(start, start + rng.random_range(0..10_u64));
        node.start_range_vs_model(0, range, b"q".to_vec()).unwrap();
        wait_until_settled(&node);
        let results = node.end_search().unwrap();
        assert_exact_coverage(&results);
        assert_eq!(results.records_processed, range.len(), "cycle {cycle}");
        assert_node_at_rest(&node);
    }
    assert_eq!(pipeline.counters.setups.load(Ordering::SeqCst), 8 * 1_000);
    node.destroy().unwrap();
}
