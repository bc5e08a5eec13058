//! Applies query outcomes to the record store and the task queue.
//!
//! ```text
//! Sending --terminal answer--------------------> Delivered | Failed
//! Sending --Sending / no answer, retries left--> Sending (retry_count + 1)
//! Sending --Sending / no answer, retries spent-> SendingStoppedQuerying
//! ```
//!
//! The queue is only changed once the store has accepted the new state, so
//! a store failure leaves the task in place for a later pass.

use std::sync::Arc;

use courier_common::{
    Clock, MessageStatus, RecordPatch, StatusUpdate,
    chrono::{DateTime, Utc},
    tracing,
};
use courier_store::{RecordStore, StoreError};

use crate::{
    policy::{PriorityPolicy, RetryPolicy},
    queue::TaskQueue,
    types::ReconciliationTask,
};

/// What happened to one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The provider reported a terminal status; the record was updated and
    /// the task removed
    Terminal(StatusUpdate),
    /// Retries ran out; the record was forced to `SendingStoppedQuerying` and
    /// the task removed
    Exhausted(StatusUpdate),
    /// Still unresolved; the task stays queued with a new retry count
    Retried { retry_count: u32 },
    /// The store rejected the outcome; the task is kept for a later pass
    Deferred,
    /// The record no longer exists; the task was removed
    Dropped,
}

impl Reconciliation {
    /// The update subscribers should hear about, if any
    #[must_use]
    pub const fn update(&self) -> Option<&StatusUpdate> {
        match self {
            Self::Terminal(update) | Self::Exhausted(update) => Some(update),
            Self::Retried { .. } | Self::Deferred | Self::Dropped => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    queue: TaskQueue,
    retry: RetryPolicy,
    priority: PriorityPolicy,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: TaskQueue,
        retry: RetryPolicy,
        priority: PriorityPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queue,
            retry,
            priority,
            clock,
        }
    }

    /// Apply the outcome of querying `task`
    ///
    /// `result` is `None` when the query produced no usable answer.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(external_id = %task.external_id, retry_count = task.retry_count)
    )]
    pub async fn reconcile(
        &self,
        task: &ReconciliationTask,
        result: Option<StatusUpdate>,
    ) -> Reconciliation {
        let now = self.clock.now();

        match result {
            Some(update) if update.status.is_terminal() => {
                self.apply_terminal(task, update, now).await
            }
            _ => self.apply_retry(task, now).await,
        }
    }

    async fn apply_terminal(
        &self,
        task: &ReconciliationTask,
        answer: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Reconciliation {
        let update = StatusUpdate {
            external_id: task.external_id.clone(),
            destination_address: task.destination_address.clone(),
            ..answer
        };

        let patch = RecordPatch {
            status: Some(update.status),
            error_code: update.error_code.clone(),
            receive_date: update.receive_date,
            retry_count: Some(task.retry_count),
            last_retry_at: Some(now),
        };

        if let Err(e) = self.store.update(&task.external_id, &patch).await {
            return self.store_failed(task, &e);
        }

        self.queue.remove(&task.external_id);
        tracing::info!(
            external_id = %task.external_id,
            status = %update.status,
            error_code = ?update.error_code,
            "Message reached terminal status"
        );

        Reconciliation::Terminal(update)
    }

    async fn apply_retry(&self, task: &ReconciliationTask, now: DateTime<Utc>) -> Reconciliation {
        let retry_count = task.retry_count.saturating_add(1);

        if self.retry.is_exhausted(retry_count) {
            return self.apply_exhausted(task, retry_count, now).await;
        }

        let patch = RecordPatch::default().with_retry(retry_count, now);
        if let Err(e) = self.store.update(&task.external_id, &patch).await {
            if matches!(e, StoreError::NotFound(_)) {
                return self.store_failed(task, &e);
            }
            // The queue carries the retry state until the next successful write
            tracing::warn!(
                external_id = %task.external_id,
                error = %e,
                "Failed to persist retry count"
            );
        }

        let priority = self.priority.compute(task.age(now), retry_count);
        self.queue
            .record_attempt(&task.external_id, retry_count, now, priority);

        tracing::debug!(
            external_id = %task.external_id,
            retry_count,
            priority,
            "Message still unresolved"
        );

        Reconciliation::Retried { retry_count }
    }

    async fn apply_exhausted(
        &self,
        task: &ReconciliationTask,
        retry_count: u32,
        now: DateTime<Utc>,
    ) -> Reconciliation {
        let patch =
            RecordPatch::status(MessageStatus::SendingStoppedQuerying).with_retry(retry_count, now);

        // The task keeps its previous attempt, so it is due again next tick
        if let Err(e) = self.store.update(&task.external_id, &patch).await {
            return self.store_failed(task, &e);
        }

        self.queue.remove(&task.external_id);
        tracing::warn!(
            external_id = %task.external_id,
            retry_count,
            "Giving up on message after exhausting retries"
        );

        Reconciliation::Exhausted(StatusUpdate::new(
            task.external_id.clone(),
            task.destination_address.clone(),
            MessageStatus::SendingStoppedQuerying,
        ))
    }

    fn store_failed(&self, task: &ReconciliationTask, error: &StoreError) -> Reconciliation {
        if matches!(error, StoreError::NotFound(_)) {
            tracing::warn!(
                external_id = %task.external_id,
                "Record no longer exists, dropping task"
            );
            self.queue.remove(&task.external_id);
            return Reconciliation::Dropped;
        }

        tracing::warn!(
            external_id = %task.external_id,
            error = %error,
            "Failed to persist outcome, will retry"
        );
        Reconciliation::Deferred
    }
}
