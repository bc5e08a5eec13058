//! Seeding the task queue from the record store

use courier_common::{
    MessageRecord,
    chrono::{DateTime, Utc},
    internal,
};
use courier_store::RecordStore;

use crate::{
    error::ReconcileError,
    policy::{PriorityPolicy, RetryPolicy},
    queue::TaskQueue,
    types::ReconciliationTask,
};

/// Rebuild the task for a persisted record, or `None` if the record needs no
/// further queries
///
/// The task keeps the record's creation time and last query time, so priority
/// aging and backoff carry on where they left off.
pub(crate) fn task_from_record(
    record: MessageRecord,
    now: DateTime<Utc>,
    retry: &RetryPolicy,
    priority: &PriorityPolicy,
) -> Option<ReconciliationTask> {
    if record.status.is_terminal() || retry.is_exhausted(record.retry_count) {
        return None;
    }

    Some(ReconciliationTask {
        priority: priority.compute(now - record.created_at, record.retry_count),
        external_id: record.external_id,
        destination_address: record.destination_address,
        retry_count: record.retry_count,
        added_at: record.created_at,
        last_attempt_at: record.last_retry_at,
    })
}

/// Enqueue the oldest `page_size` non-terminal records
///
/// Returns the number of tasks added; records already queued are merged.
///
/// # Errors
/// Returns an error if the store cannot be listed
pub(crate) async fn load(
    store: &dyn RecordStore,
    queue: &TaskQueue,
    page_size: usize,
    now: DateTime<Utc>,
    retry: &RetryPolicy,
    priority: &PriorityPolicy,
) -> Result<usize, ReconcileError> {
    let records = store.list_pending(page_size, retry.max_retry_count).await?;
    let found = records.len();

    let tasks = records
        .into_iter()
        .filter_map(|record| task_from_record(record, now, retry, priority));
    let added = queue.enqueue_all(tasks);

    internal!(
        level = INFO,
        "Bootstrapped reconciliation queue: {added} added from {found} pending records"
    );

    Ok(added)
}
