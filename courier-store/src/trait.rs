use async_trait::async_trait;
use courier_common::{MessageRecord, RecordPatch};

/// Storage for [`MessageRecord`]s, keyed by external id
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Store a new record
    ///
    /// # Errors
    /// [`crate::StoreError::AlreadyExists`] if a record with the same external id
    /// is already stored, or any backend failure
    async fn insert(&self, record: MessageRecord) -> crate::Result<()>;

    /// Read one record
    ///
    /// # Errors
    /// [`crate::StoreError::NotFound`] if no such record exists, or any backend failure
    async fn get(&self, external_id: &str) -> crate::Result<MessageRecord>;

    /// All records, oldest first
    ///
    /// # Errors
    /// Any backend failure
    async fn list(&self) -> crate::Result<Vec<MessageRecord>>;

    /// Update the status-related fields of a record and return the result
    ///
    /// # Errors
    /// [`crate::StoreError::NotFound`] if no such record exists, or any backend failure
    async fn update(&self, external_id: &str, patch: &RecordPatch) -> crate::Result<MessageRecord>;

    /// Remove a record
    ///
    /// # Errors
    /// [`crate::StoreError::NotFound`] if no such record exists, or any backend failure
    async fn delete(&self, external_id: &str) -> crate::Result<()>;

    /// Up to `limit` records with a non-terminal status and fewer than
    /// `max_retry_count` queries, oldest first
    ///
    /// # Errors
    /// Any backend failure
    async fn list_pending(
        &self,
        limit: usize,
        max_retry_count: u32,
    ) -> crate::Result<Vec<MessageRecord>> {
        let mut records = self.list().await?;
        records.retain(|record| {
            !record.status.is_terminal() && record.retry_count < max_retry_count
        });
        records.truncate(limit);
        Ok(records)
    }
}
