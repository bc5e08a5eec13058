use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MessageStatus;

/// Persisted state of one outbound message.
///
/// Records are created by the sending side before the engine sees them. While
/// a reconciliation task exists for a record, the engine is the only writer of
/// the status-related fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub external_id: String,
    pub destination_address: String,
    pub status: MessageStatus,
    pub error_code: Option<String>,
    pub receive_date: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// A freshly sent message awaiting its first status query
    #[must_use]
    pub fn sending(
        external_id: impl Into<String>,
        destination_address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            destination_address: destination_address.into(),
            status: MessageStatus::Sending,
            error_code: None,
            receive_date: None,
            retry_count: 0,
            last_retry_at: None,
            created_at,
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(error_code) = &patch.error_code {
            self.error_code = Some(error_code.clone());
        }
        if let Some(receive_date) = patch.receive_date {
            self.receive_date = Some(receive_date);
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(last_retry_at) = patch.last_retry_at {
            self.last_retry_at = Some(last_retry_at);
        }
    }
}

/// Partial update of the status-related fields of a [`MessageRecord`].
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub status: Option<MessageStatus>,
    pub error_code: Option<String>,
    pub receive_date: Option<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    #[must_use]
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry_count: u32, last_retry_at: DateTime<Utc>) -> Self {
        self.retry_count = Some(retry_count);
        self.last_retry_at = Some(last_retry_at);
        self
    }
}
