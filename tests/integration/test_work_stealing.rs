//! Work distribution tests: every record id is claimed exactly once no matter
//! how threads interleave, and stealing splits ranges the documented way.

use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashSet;
use hmmnode_lib::worker_node::{ClaimSource, RecordRange, WorkDispatcher, lock_order};
use proptest::prelude::*;

/// Claim records from `threads` threads until the dispatcher runs dry.
/// Returns every claimed id, per thread.
fn claim_all(dispatcher: &WorkDispatcher, threads: usize) -> Vec<Vec<u64>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|tid| {
                scope.spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(claim) = dispatcher.next_record(tid) {
                        claimed.push(claim.record_id);
                    }
                    claimed
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_steal_takes_upper_half_of_largest_range() {
    let dispatcher = WorkDispatcher::new(3, 1_000);
    dispatcher.initialize_search(RecordRange::new(0, 999));

    let first = dispatcher.next_record(0).unwrap();
    assert_eq!(first.record_id, 0);
    assert_eq!(first.source, ClaimSource::Queue);

    // Thread 0 holds 1..=999: 999 ids, keeps 500, loses 499.
    let stolen = dispatcher.next_record(1).unwrap();
    assert_eq!(stolen.source, ClaimSource::Stolen);
    assert_eq!(stolen.record_id, 501);
    assert_eq!(dispatcher.descriptor(0).snapshot(), RecordRange::new(1, 500));
    assert_eq!(dispatcher.descriptor(1).snapshot(), RecordRange::new(502, 999));

    // The largest range is now thread 0's (500 ids against 498).
    let third = dispatcher.next_record(2).unwrap();
    assert_eq!(third.source, ClaimSource::Stolen);
    assert_eq!(third.record_id, 251);
    assert_eq!(dispatcher.steal_count(), 2);
    assert!(dispatcher.descriptors_disjoint());
}

#[test]
fn test_single_ids_are_never_stolen() {
    let dispatcher = WorkDispatcher::new(2, 2);
    dispatcher.initialize_search(RecordRange::new(0, 1));
    assert_eq!(dispatcher.next_record(0).unwrap().record_id, 0);
    assert_eq!(dispatcher.descriptor(0).remaining(), 1);
    assert!(dispatcher.next_record(1).is_none());
    assert_eq!(dispatcher.next_record(0).unwrap().record_id, 1);
    assert!(!dispatcher.has_remaining_work());
}

#[test]
fn test_added_work_is_stealable_again() {
    let dispatcher = WorkDispatcher::new(2, 100);
    dispatcher.initialize_search(RecordRange::new(0, 0));
    assert_eq!(dispatcher.next_record(0).unwrap().record_id, 0);
    assert!(dispatcher.next_record(1).is_none());
    assert!(dispatcher.stealing_exhausted());

    dispatcher.add_work(RecordRange::new(10, 109));
    assert!(!dispatcher.stealing_exhausted());
    let claimed = claim_all(&dispatcher, 2);
    let total: usize = claimed.iter().map(Vec::len).sum();
    assert_eq!(total, 100);
}

#[test]
fn test_descriptors_stay_disjoint_while_claiming() {
    let dispatcher = WorkDispatcher::new(6, 5_000);
    dispatcher.initialize_search(RecordRange::new(0, 49_999));
    let done = AtomicBool::new(false);

    let (claimed, overlaps) = std::thread::scope(|scope| {
        let observer = scope.spawn(|| {
            let mut overlaps = 0;
            while !done.load(Ordering::Acquire) {
                if !dispatcher.descriptors_disjoint() {
                    overlaps += 1;
                }
            }
            overlaps
        });
        let claimed = claim_all(&dispatcher, 6);
        done.store(true, Ordering::Release);
        (claimed, observer.join().unwrap())
    });

    assert_eq!(overlaps, 0);
    let ids: AHashSet<u64> = claimed.iter().flatten().copied().collect();
    assert_eq!(ids.len(), 50_000);
    assert_eq!(claimed.iter().map(Vec::len).sum::<usize>(), 50_000);
    assert_eq!(lock_order::violations(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_every_id_claimed_exactly_once(
        start in 0u64..10_000,
        len in 0u64..5_000,
        chunk_size in 1u64..700,
        threads in 1usize..8,
        extra in proptest::collection::vec((0u64..10_000, 1u64..500), 0..4),
    ) {
        let dispatcher = WorkDispatcher::new(threads, chunk_size);
        let first =
            if len == 0 { RecordRange::EMPTY } else { RecordRange::new(start, start + len - 1) };
        dispatcher.initialize_search(first);

        // Later macro-chunks are placed past everything queued so far.
        let mut expected = first.len();
        let mut next_start = start + len + 1;
        for (gap, extra_len) in &extra {
            let range = RecordRange::new(next_start + gap, next_start + gap + extra_len - 1);
            dispatcher.add_work(range);
            expected += range.len();
            next_start = range.end + 1;
        }

        let claimed = claim_all(&dispatcher, threads);
        let total: usize = claimed.iter().map(Vec::len).sum();
        let unique: AHashSet<u64> = claimed.iter().flatten().copied().collect();
        prop_assert_eq!(total as u64, expected);
        prop_assert_eq!(unique.len() as u64, expected);
        prop_assert!(!dispatcher.has_remaining_work());

        // Each thread claims ascending ids within any one descriptor refill, so
        // its claims as a whole never repeat an id either.
        for ids in &claimed {
            let own: AHashSet<u64> = ids.iter().copied().collect();
            prop_assert_eq!(own.len(), ids.len());
        }
    }

    #[test]
    fn prop_split_upper_half_partitions_range(start in 0u64..1_000_000, len in 2u64..10_000) {
        let mut owner = RecordRange::new(start, start + len - 1);
        let stolen = owner.split_upper_half().unwrap();
        prop_assert_eq!(owner.len(), len.div_ceil(2));
        prop_assert_eq!(stolen.len(), len / 2);
        prop_assert_eq!(owner.end + 1, stolen.start);
        prop_assert_eq!(stolen.end, start + len - 1);
    }
}
