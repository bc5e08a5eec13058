//! Property-based tests for priority aging and queue uniqueness

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};

use courier_common::chrono::{TimeDelta, TimeZone, Utc};
use courier_reconcile::{
    EnqueueOutcome, ReconciliationTask, TaskQueue,
    policy::{RetryPolicy, compute_priority},
};
use proptest::prelude::*;

const DECAY_MS: u64 = 300_000;

proptest! {
    #[test]
    fn priority_stays_in_range(age_ms in any::<u64>(), retries in any::<u32>()) {
        let priority = compute_priority(age_ms, retries, DECAY_MS);
        prop_assert!((1..=10).contains(&priority));
    }

    #[test]
    fn priority_non_decreasing_in_age(
        age_ms in 0u64..10_000_000,
        extra_ms in 0u64..10_000_000,
        retries in 0u32..20,
    ) {
        prop_assert!(
            compute_priority(age_ms, retries, DECAY_MS)
                <= compute_priority(age_ms + extra_ms, retries, DECAY_MS)
        );
    }

    #[test]
    fn priority_non_decreasing_in_retries(
        age_ms in 0u64..10_000_000,
        retries in 0u32..20,
        extra in 0u32..20,
    ) {
        prop_assert!(
            compute_priority(age_ms, retries, DECAY_MS)
                <= compute_priority(age_ms, retries + extra, DECAY_MS)
        );
    }

    #[test]
    fn queue_never_holds_duplicate_ids(
        ops in prop::collection::vec((0u8..6, 0u8..2, 1u8..=10, 0i64..600), 0..64)
    ) {
        let queue = TaskQueue::new();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        // id -> (destination of the accepted task, lowest accepted priority)
        let mut expected: HashMap<String, (String, u8)> = HashMap::new();

        for (id, destination, priority, offset) in ops {
            let id = format!("ext-{id}");
            let destination = format!("1380000000{destination}");
            let task = ReconciliationTask::new(
                id.clone(),
                destination.clone(),
                priority,
                base + TimeDelta::seconds(offset),
            );

            match queue.enqueue(task) {
                EnqueueOutcome::Inserted => {
                    prop_assert!(!expected.contains_key(&id));
                    expected.insert(id, (destination, priority));
                }
                EnqueueOutcome::Merged => {
                    let entry = expected.get_mut(&id).unwrap();
                    prop_assert_eq!(&entry.0, &destination);
                    entry.1 = entry.1.min(priority);
                }
                EnqueueOutcome::Rejected => {
                    prop_assert_ne!(&expected[&id].0, &destination);
                }
            }
        }

        let snapshot = queue.snapshot();
        let ids: HashSet<_> = snapshot.iter().map(|t| t.external_id.clone()).collect();
        prop_assert_eq!(ids.len(), snapshot.len());
        prop_assert_eq!(snapshot.len(), expected.len());

        for task in &snapshot {
            prop_assert_eq!(task.priority, expected[&task.external_id].1);
        }

        // Snapshot order is the dequeue order
        let eligible = queue.dequeue_eligible(usize::MAX, base, &RetryPolicy::default());
        prop_assert_eq!(eligible, snapshot.clone());
        for pair in snapshot.windows(2) {
            prop_assert!(
                (pair[0].priority, pair[0].added_at) <= (pair[1].priority, pair[1].added_at)
            );
        }
    }
}
