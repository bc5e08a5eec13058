//! Reconciliation task queue

pub mod stats;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use courier_common::{
    chrono::{DateTime, Utc},
    tracing,
};
use parking_lot::Mutex;

pub use self::stats::QueueStats;
use crate::{policy::RetryPolicy, types::ReconciliationTask};

/// Result of [`TaskQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task was not queued before
    Inserted,
    /// A task with the same id and destination was already queued; the lower
    /// priority was kept and its retry state left untouched
    Merged,
    /// A task with the same id but a different destination is queued; the new
    /// task was dropped
    Rejected,
}

/// Ordering key: priority ascending, then insertion time, then arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: u8,
    added_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug)]
struct Entry {
    key: QueueKey,
    task: ReconciliationTask,
}

#[derive(Debug, Default)]
struct Inner {
    order: BTreeMap<QueueKey, String>,
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    fn key_for(&mut self, task: &ReconciliationTask) -> QueueKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        QueueKey {
            priority: task.priority,
            added_at: task.added_at,
            seq,
        }
    }

    fn insert(&mut self, task: ReconciliationTask) -> EnqueueOutcome {
        if let Some(entry) = self.entries.get_mut(&task.external_id) {
            if entry.task.destination_address != task.destination_address {
                tracing::warn!(
                    external_id = %task.external_id,
                    queued = %entry.task.destination_address,
                    rejected = %task.destination_address,
                    "External id already queued for a different destination, ignoring"
                );
                return EnqueueOutcome::Rejected;
            }

            if task.priority < entry.task.priority {
                self.order.remove(&entry.key);
                entry.task.priority = task.priority;
                entry.key.priority = task.priority;
                self.order.insert(entry.key, task.external_id);
            }

            return EnqueueOutcome::Merged;
        }

        let key = self.key_for(&task);
        self.order.insert(key, task.external_id.clone());
        self.entries
            .insert(task.external_id.clone(), Entry { key, task });

        EnqueueOutcome::Inserted
    }

    fn reprioritise(&mut self, external_id: &str, priority: u8) {
        let Some(entry) = self.entries.get_mut(external_id) else {
            return;
        };

        if entry.key.priority != priority {
            self.order.remove(&entry.key);
            entry.key.priority = priority;
            entry.task.priority = priority;
            self.order.insert(entry.key, external_id.to_string());
        }
    }
}

/// Priority-ordered set of pending reconciliation tasks
///
/// At most one task per external id. Cloning shares the underlying queue.
/// Every operation is a short critical section; none of them fail for an
/// absent id.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, or merge it into the queued task with the same id
    pub fn enqueue(&self, task: ReconciliationTask) -> EnqueueOutcome {
        self.inner.lock().insert(task)
    }

    /// Enqueue many tasks under one lock, returning how many were new
    pub fn enqueue_all(&self, tasks: impl IntoIterator<Item = ReconciliationTask>) -> usize {
        let mut inner = self.inner.lock();
        tasks
            .into_iter()
            .filter(|task| inner.insert(task.clone()) == EnqueueOutcome::Inserted)
            .count()
    }

    /// Up to `max_count` tasks outside their backoff window, in queue order
    ///
    /// Returns snapshots; the tasks stay queued until they are reconciled.
    #[must_use]
    pub fn dequeue_eligible(
        &self,
        max_count: usize,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Vec<ReconciliationTask> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| &entry.task)
            .filter(|task| !policy.is_in_backoff_window(task, now))
            .take(max_count)
            .cloned()
            .collect()
    }

    /// Record a non-terminal attempt: bump the retry count, stamp the attempt
    /// time and move the task to its new priority
    pub fn record_attempt(
        &self,
        external_id: &str,
        retry_count: u32,
        attempted_at: DateTime<Utc>,
        priority: u8,
    ) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(external_id) {
            entry.task.retry_count = retry_count;
            entry.task.last_attempt_at = Some(attempted_at);
        }
        inner.reprioritise(external_id, priority);
    }

    /// Remove a task; absent ids are ignored
    pub fn remove(&self, external_id: &str) -> Option<ReconciliationTask> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(external_id)?;
        inner.order.remove(&entry.key);
        Some(entry.task)
    }

    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<ReconciliationTask> {
        self.inner
            .lock()
            .entries
            .get(external_id)
            .map(|entry| entry.task.clone())
    }

    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.inner.lock().entries.contains_key(external_id)
    }

    /// All tasks in queue order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ReconciliationTask> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| entry.task.clone())
            .collect()
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats::collect(inner.entries.values().map(|entry| &entry.task), now)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
