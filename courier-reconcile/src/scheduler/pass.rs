//! One reconciliation pass

use courier_common::{MessageStatus, tracing};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{reconciler::Reconciliation, service::ReconcileService};

/// What a completed pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Tasks sent to the status endpoint
    pub queried: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Tasks abandoned as `SendingStoppedQuerying`
    pub exhausted: usize,
    /// Tasks left queued with a higher retry count
    pub retried: usize,
    /// Tasks whose outcome the store did not accept
    pub deferred: usize,
    /// Tasks whose record has disappeared from the store
    pub dropped: usize,
    /// Queued tasks not queried, because of backoff or the batch size
    pub skipped: usize,
}

impl PassReport {
    fn record(&mut self, outcome: &Reconciliation) {
        match outcome {
            Reconciliation::Terminal(update) => match update.status {
                MessageStatus::Delivered => self.delivered += 1,
                MessageStatus::Failed => self.failed += 1,
                MessageStatus::SendingStoppedQuerying | MessageStatus::Sending => {
                    self.exhausted += 1;
                }
            },
            Reconciliation::Exhausted(_) => self.exhausted += 1,
            Reconciliation::Retried { .. } => self.retried += 1,
            Reconciliation::Deferred => self.deferred += 1,
            Reconciliation::Dropped => self.dropped += 1,
        }
    }

    /// Number of tasks that left the queue during the pass
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.delivered + self.failed + self.exhausted + self.dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass was already running; nothing was done
    Skipped,
}

impl PassOutcome {
    #[must_use]
    pub const fn report(&self) -> Option<&PassReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

/// Query a batch of eligible tasks and reconcile the answers
///
/// Queries run `max_concurrent` at a time; each chunk is fully reconciled
/// before the next chunk is sent. Subscribers are notified once, at the end,
/// if any task reached a terminal status.
pub(crate) async fn run(service: &ReconcileService) -> PassOutcome {
    let Some(_guard) = service.scheduler.try_begin_pass() else {
        tracing::debug!("Reconciliation pass already in progress, skipping");
        return PassOutcome::Skipped;
    };

    let now = service.clock.now();
    let batch = service
        .queue
        .dequeue_eligible(service.config.batch_size, now, &service.retry);

    let mut report = PassReport {
        queried: batch.len(),
        skipped: service.queue.len().saturating_sub(batch.len()),
        ..PassReport::default()
    };

    let mut updates = Vec::new();

    for chunk in batch.chunks(service.config.max_concurrent) {
        let answers = join_all(chunk.iter().map(|task| {
            service
                .client
                .query_status(&task.external_id, &task.destination_address)
        }))
        .await;

        for (task, answer) in chunk.iter().zip(answers) {
            let outcome = service.reconciler.reconcile(task, answer).await;
            report.record(&outcome);
            if let Some(update) = outcome.update() {
                updates.push(update.clone());
            }
        }
    }

    if !updates.is_empty() {
        let notified = service.notifier.notify(&updates);
        tracing::debug!(
            updates = updates.len(),
            subscribers = notified,
            "Notified subscribers"
        );
    }

    tracing::debug!(?report, remaining = service.queue.len(), "Reconciliation pass complete");

    PassOutcome::Completed(report)
}
