//! Scripted status endpoint for driving the engine in tests
//!
//! - Answers per external id are consumed in order; an exhausted script
//!   answers `None` (a failed query)
//! - Records every call and the peak number of concurrent calls
//! - Optionally holds every call until the test releases it
#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::{MessageStatus, StatusUpdate};
use courier_reconcile::StatusQuery;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Default)]
pub struct ScriptedQuery {
    scripts: Mutex<HashMap<String, VecDeque<Option<StatusUpdate>>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    entered: Notify,
}

impl ScriptedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for a permit from the returned semaphore
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let query = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (query, gate)
    }

    pub fn script(
        &self,
        external_id: &str,
        answers: impl IntoIterator<Item = Option<StatusUpdate>>,
    ) {
        self.scripts
            .lock()
            .entry(external_id.to_string())
            .or_default()
            .extend(answers);
    }

    /// Answer with `status` on the next call for `external_id`
    pub fn answer(&self, external_id: &str, destination: &str, status: MessageStatus) {
        self.script(
            external_id,
            [Some(StatusUpdate::new(external_id, destination, status))],
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once a call has started
    pub async fn wait_for_call(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl StatusQuery for ScriptedQuery {
    async fn query_status(
        &self,
        external_id: &str,
        _destination_address: &str,
    ) -> Option<StatusUpdate> {
        self.calls.lock().push(external_id.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        // Let every other query in the chunk start before this one finishes
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.scripts
            .lock()
            .get_mut(external_id)
            .and_then(VecDeque::pop_front)
            .flatten()
    }
}
