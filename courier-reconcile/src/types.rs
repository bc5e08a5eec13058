//! Type definitions for the reconciliation queue

use courier_common::chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::priority::{MAX_PRIORITY, MIN_PRIORITY};

/// A message whose final delivery outcome is still unknown
///
/// Owned by the task queue; callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTask {
    pub external_id: String,
    pub destination_address: String,
    /// 1 (most urgent) to 10
    pub priority: u8,
    pub retry_count: u32,
    pub added_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ReconciliationTask {
    /// A task that has never been queried
    ///
    /// `priority` is clamped into the valid range.
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        destination_address: impl Into<String>,
        priority: u8,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            destination_address: destination_address.into(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            retry_count: 0,
            added_at,
            last_attempt_at: None,
        }
    }

    /// Time since the task entered the queue, never negative
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> courier_common::chrono::TimeDelta {
        (now - self.added_at).max(courier_common::chrono::TimeDelta::zero())
    }
}

#[cfg(test)]
mod tests {
    use courier_common::chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_new_clamps_priority() {
        let now = Utc::now();
        assert_eq!(ReconciliationTask::new("a", "1", 0, now).priority, 1);
        assert_eq!(ReconciliationTask::new("a", "1", 42, now).priority, 10);
        assert_eq!(ReconciliationTask::new("a", "1", 4, now).priority, 4);
    }

    #[test]
    fn test_age_never_negative() {
        let now = Utc::now();
        let task = ReconciliationTask::new("a", "1", 1, now);
        assert_eq!(task.age(now - TimeDelta::seconds(5)), TimeDelta::zero());
        assert_eq!(task.age(now + TimeDelta::seconds(5)), TimeDelta::seconds(5));
    }
}
