#![allow(dead_code)] // Test utility module - not all methods used in every test

pub mod mock_query;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use courier_common::{
    Clock as _, ManualClock, MessageRecord, RecordPatch, StatusUpdate,
    chrono::{DateTime, TimeZone, Utc},
};
use courier_reconcile::{ReconcileService, ReconcilerConfig};
use courier_store::{MemoryRecordStore, RecordStore, StoreError};
use parking_lot::Mutex;

pub use self::mock_query::ScriptedQuery;

/// Memory store whose next `n` updates fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryRecordStore,
    failing_updates: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(&self, record: MessageRecord) -> courier_store::Result<()> {
        self.inner.insert(record).await
    }

    async fn get(&self, external_id: &str) -> courier_store::Result<MessageRecord> {
        self.inner.get(external_id).await
    }

    async fn list(&self) -> courier_store::Result<Vec<MessageRecord>> {
        self.inner.list().await
    }

    async fn update(
        &self,
        external_id: &str,
        patch: &RecordPatch,
    ) -> courier_store::Result<MessageRecord> {
        let failing = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Internal("simulated outage".to_string()));
        }
        self.inner.update(external_id, patch).await
    }

    async fn delete(&self, external_id: &str) -> courier_store::Result<()> {
        self.inner.delete(external_id).await
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// A service wired to a scripted endpoint, a flaky memory store and a
/// manual clock, with every notification batch captured
pub struct Harness {
    pub service: Arc<ReconcileService>,
    pub store: Arc<FlakyStore>,
    pub client: Arc<ScriptedQuery>,
    pub clock: ManualClock,
    pub notifications: Arc<Mutex<Vec<Vec<StatusUpdate>>>>,
}

impl Harness {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self::with_client(config, ScriptedQuery::new())
    }

    pub fn with_client(config: ReconcilerConfig, client: ScriptedQuery) -> Self {
        let store = Arc::new(FlakyStore::default());
        let client = Arc::new(client);
        let clock = ManualClock::new(epoch());

        let service = Arc::new(
            ReconcileService::with_clock(
                config,
                store.clone(),
                client.clone(),
                Arc::new(clock.clone()),
            )
            .expect("valid config"),
        );

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notifications);
        let _subscription = service.subscribe(move |updates| {
            sink.lock().push(updates.to_vec());
            Ok(())
        });

        Self {
            service,
            store,
            client,
            clock,
            notifications,
        }
    }

    /// Persist a `Sending` record created at the current clock time
    pub async fn sent(&self, external_id: &str, destination: &str) {
        self.store
            .insert(MessageRecord::sending(external_id, destination, self.clock.now()))
            .await
            .unwrap();
    }

    pub async fn record(&self, external_id: &str) -> MessageRecord {
        self.store.get(external_id).await.unwrap()
    }

    pub fn notified_ids(&self) -> Vec<Vec<String>> {
        self.notifications
            .lock()
            .iter()
            .map(|batch| batch.iter().map(|u| u.external_id.clone()).collect())
            .collect()
    }
}
