//! Retry policy for status queries.
//!
//! A task that has been retried `n` times may not be queried again until
//! `backoff_base^n` seconds after its last attempt. The window grows without
//! bound; `max_retry_count` is what eventually stops a task.

use courier_common::chrono::{DateTime, TimeDelta, Utc};

use crate::{config::ReconcilerConfig, types::ReconciliationTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry_count: u32,
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: 15,
            backoff_base: 2,
        }
    }
}

impl From<&ReconcilerConfig> for RetryPolicy {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            max_retry_count: config.max_retry_count,
            backoff_base: config.backoff_base,
        }
    }
}

impl RetryPolicy {
    /// Minimum time between attempts for a task retried `retry_count` times
    ///
    /// `None` when the window is too large to represent, which is treated as
    /// "never eligible again".
    #[must_use]
    pub fn backoff_window(&self, retry_count: u32) -> Option<TimeDelta> {
        let secs = self.backoff_base.checked_pow(retry_count)?;
        TimeDelta::try_seconds(i64::try_from(secs).ok()?)
    }

    /// Whether `task` must be skipped at `now`
    ///
    /// A task that was never attempted is always eligible.
    #[must_use]
    pub fn is_in_backoff_window(&self, task: &ReconciliationTask, now: DateTime<Utc>) -> bool {
        let Some(last_attempt) = task.last_attempt_at else {
            return false;
        };

        self.backoff_window(task.retry_count)
            .is_none_or(|window| now - last_attempt < window)
    }

    /// Whether a task that has now been retried `retry_count` times should be
    /// abandoned
    #[must_use]
    pub const fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retry_count
    }
}
