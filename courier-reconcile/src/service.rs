//! The reconciliation service: one instance per process, owning the queue,
//! the scheduler and the notifier, with the store, status client and clock
//! injected by the composition root.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{Clock, Signal, StatusUpdate, SystemClock, internal, tracing};
use courier_store::RecordStore;
use tokio::sync::broadcast;

use crate::{
    bootstrap,
    client::StatusQuery,
    config::ReconcilerConfig,
    error::ReconcileError,
    notifier::{Notifier, Subscription},
    policy::{PriorityPolicy, RetryPolicy},
    queue::{EnqueueOutcome, QueueStats, TaskQueue},
    reconciler::Reconciler,
    scheduler::{self, PassOutcome, Scheduler, SchedulerState},
    types::ReconciliationTask,
};

/// Delivery-status reconciliation engine
///
/// Share it behind an `Arc`: one task runs [`ReconcileService::serve`],
/// everything else calls in through `&self`.
#[derive(Debug)]
pub struct ReconcileService {
    pub(crate) config: ReconcilerConfig,
    pub(crate) queue: TaskQueue,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) client: Arc<dyn StatusQuery>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retry: RetryPolicy,
    pub(crate) priority: PriorityPolicy,
    pub(crate) reconciler: Reconciler,
    pub(crate) notifier: Notifier,
    pub(crate) scheduler: Scheduler,
}

impl ReconcileService {
    /// # Errors
    /// Returns an error if the configuration is invalid
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn StatusQuery>,
    ) -> Result<Self, ReconcileError> {
        Self::with_clock(config, store, client, Arc::new(SystemClock))
    }

    /// # Errors
    /// Returns an error if the configuration is invalid
    pub fn with_clock(
        config: ReconcilerConfig,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn StatusQuery>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ReconcileError> {
        config.validate()?;

        let queue = TaskQueue::new();
        let retry = RetryPolicy::from(&config);
        let priority = PriorityPolicy::new(config.priority_decay_interval());
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            queue.clone(),
            retry,
            priority,
            Arc::clone(&clock),
        );

        internal!(
            "Reconciliation service configured: tick={}ms, batch={}, concurrency={}, max_retries={}",
            config.tick_interval_ms,
            config.batch_size,
            config.max_concurrent,
            config.max_retry_count
        );

        Ok(Self {
            config,
            queue,
            store,
            client,
            clock,
            retry,
            priority,
            reconciler,
            notifier: Notifier::new(),
            scheduler: Scheduler::default(),
        })
    }

    /// Start tracking a freshly sent message
    pub fn add_task(
        &self,
        external_id: impl Into<String>,
        destination_address: impl Into<String>,
        priority: u8,
    ) -> EnqueueOutcome {
        let task = ReconciliationTask::new(
            external_id,
            destination_address,
            priority,
            self.clock.now(),
        );
        self.enqueue(task)
    }

    /// Enqueue a prepared task, waking the scheduler if it is idle
    pub fn enqueue(&self, task: ReconciliationTask) -> EnqueueOutcome {
        let external_id = task.external_id.clone();
        let outcome = self.queue.enqueue(task);

        tracing::debug!(%external_id, ?outcome, "Enqueued reconciliation task");

        if outcome == EnqueueOutcome::Inserted {
            self.scheduler.wake();
        }

        outcome
    }

    /// Stop tracking a message; absent ids are ignored
    pub fn remove_task(&self, external_id: &str) -> Option<ReconciliationTask> {
        self.queue.remove(external_id)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[StatusUpdate]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    /// Run a pass now, outside the tick cadence
    ///
    /// Honours the pass guard: if a pass is already running this returns
    /// [`PassOutcome::Skipped`] without querying anything.
    pub async fn trigger_now(&self) -> PassOutcome {
        let outcome = scheduler::pass::run(self).await;
        if !self.queue.is_empty() {
            self.scheduler.wake();
        }
        outcome
    }

    /// Seed the queue from the store's non-terminal records
    ///
    /// Returns the number of tasks added.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read
    pub async fn bootstrap(&self) -> Result<usize, ReconcileError> {
        let added = bootstrap::load(
            self.store.as_ref(),
            &self.queue,
            self.config.bootstrap_page_size,
            self.clock.now(),
            &self.retry,
            &self.priority,
        )
        .await?;

        if !self.queue.is_empty() {
            self.scheduler.wake();
        }

        Ok(added)
    }

    /// Run the scheduler until a shutdown signal arrives
    ///
    /// # Errors
    /// Currently infallible; store and query failures are retried inside
    /// passes
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<(), ReconcileError> {
        internal!("Reconciliation service starting");
        scheduler::run(self, shutdown).await;
        Ok(())
    }

    /// Queued tasks in priority order
    #[must_use]
    pub fn tasks(&self) -> Vec<ReconciliationTask> {
        self.queue.snapshot()
    }

    #[must_use]
    pub fn task(&self, external_id: &str) -> Option<ReconciliationTask> {
        self.queue.get(external_id)
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats(self.clock.now())
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Operations the control surface needs from the engine
///
/// Lets control handlers be tested against a stub instead of a full engine.
#[async_trait]
pub trait ReconcileQueryService: Send + Sync {
    fn queue_len(&self) -> usize;

    fn tasks(&self) -> Vec<ReconciliationTask>;

    fn queue_stats(&self) -> QueueStats;

    fn state(&self) -> SchedulerState;

    fn remove_task(&self, external_id: &str) -> Option<ReconciliationTask>;

    async fn trigger_now(&self) -> PassOutcome;

    /// # Errors
    /// Returns an error if the store cannot be read
    async fn bootstrap(&self) -> Result<usize, ReconcileError>;
}

#[async_trait]
impl ReconcileQueryService for ReconcileService {
    fn queue_len(&self) -> usize {
        Self::queue_len(self)
    }

    fn tasks(&self) -> Vec<ReconciliationTask> {
        Self::tasks(self)
    }

    fn queue_stats(&self) -> QueueStats {
        Self::queue_stats(self)
    }

    fn state(&self) -> SchedulerState {
        Self::state(self)
    }

    fn remove_task(&self, external_id: &str) -> Option<ReconciliationTask> {
        Self::remove_task(self, external_id)
    }

    async fn trigger_now(&self) -> PassOutcome {
        Self::trigger_now(self).await
    }

    async fn bootstrap(&self) -> Result<usize, ReconcileError> {
        Self::bootstrap(self).await
    }
}
