use std::collections::BTreeMap;

use courier_common::chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ReconciliationTask;

/// Point-in-time summary of the task queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    /// Number of tasks at each priority value
    pub by_priority: BTreeMap<u8, usize>,
    /// Age of the oldest task in seconds
    pub oldest_age_secs: Option<u64>,
    pub max_retry_count: u32,
}

impl QueueStats {
    pub(crate) fn collect<'a>(
        tasks: impl Iterator<Item = &'a ReconciliationTask>,
        now: DateTime<Utc>,
    ) -> Self {
        tasks.fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            *stats.by_priority.entry(task.priority).or_default() += 1;
            stats.max_retry_count = stats.max_retry_count.max(task.retry_count);

            let age = u64::try_from(task.age(now).num_seconds()).unwrap_or(0);
            stats.oldest_age_secs = Some(stats.oldest_age_secs.map_or(age, |oldest| oldest.max(age)));

            stats
        })
    }
}
