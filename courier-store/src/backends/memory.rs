use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use courier_common::{MessageRecord, RecordPatch};

use crate::{StoreError, r#trait::RecordStore};

/// In-memory record store
///
/// Records live in a `HashMap` behind an `RwLock`. Intended for tests and
/// development; nothing survives a restart.
///
/// An optional capacity makes inserts fail once the limit is reached, which
/// keeps an accidental production deployment from growing without bound.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    pub(crate) records: Arc<RwLock<HashMap<String, MessageRecord>>>,
    capacity: Option<usize>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Number of stored records
    ///
    /// Recovers the data if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: MessageRecord) -> crate::Result<()> {
        let mut records = self.records.write()?;

        if records.contains_key(&record.external_id) {
            return Err(StoreError::AlreadyExists(record.external_id));
        }

        if let Some(cap) = self.capacity
            && records.len() >= cap
        {
            return Err(StoreError::CapacityExceeded(cap));
        }

        records.insert(record.external_id.clone(), record);
        Ok(())
    }

    async fn get(&self, external_id: &str) -> crate::Result<MessageRecord> {
        self.records
            .read()?
            .get(external_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))
    }

    async fn list(&self) -> crate::Result<Vec<MessageRecord>> {
        let mut records: Vec<MessageRecord> = self.records.read()?.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        Ok(records)
    }

    async fn update(&self, external_id: &str, patch: &RecordPatch) -> crate::Result<MessageRecord> {
        let mut records = self.records.write()?;
        let record = records
            .get_mut(external_id)
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))?;
        record.apply(patch);
        Ok(record.clone())
    }

    async fn delete(&self, external_id: &str) -> crate::Result<()> {
        self.records
            .write()?
            .remove(external_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))
    }
}
