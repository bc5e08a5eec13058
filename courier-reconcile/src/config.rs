use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

const fn default_tick_interval_ms() -> u64 {
    2000
}

const fn default_batch_size() -> usize {
    5
}

const fn default_max_concurrent() -> usize {
    3
}

const fn default_max_retry_count() -> u32 {
    15
}

const fn default_backoff_base() -> u64 {
    2
}

const fn default_priority_decay_interval() -> u64 {
    300 // 5 minutes
}

const fn default_bootstrap_page_size() -> usize {
    200
}

/// Tuning for the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Time between passes while the queue is non-empty (in milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of tasks queried in one pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of status queries in flight at once within a pass
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Number of non-terminal query attempts after which a message is
    /// abandoned as `SendingStoppedQuerying`
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    /// Base of the exponential backoff, in seconds: a task that has been
    /// retried `n` times waits `backoff_base^n` seconds between queries
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Age after which a task loses one step of priority (in seconds)
    #[serde(default = "default_priority_decay_interval")]
    pub priority_decay_interval_secs: u64,

    /// Maximum number of records read by one bootstrap
    #[serde(default = "default_bootstrap_page_size")]
    pub bootstrap_page_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            max_retry_count: default_max_retry_count(),
            backoff_base: default_backoff_base(),
            priority_decay_interval_secs: default_priority_decay_interval(),
            bootstrap_page_size: default_bootstrap_page_size(),
        }
    }
}

impl ReconcilerConfig {
    /// Check the configuration for values the engine cannot run with
    ///
    /// # Errors
    /// Returns [`ReconcileError::Configuration`] naming the first invalid field
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let invalid = |field: &str| {
            Err(ReconcileError::Configuration(format!(
                "{field} must be at least 1"
            )))
        };

        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms");
        }
        if self.batch_size == 0 {
            return invalid("batch_size");
        }
        if self.max_concurrent == 0 {
            return invalid("max_concurrent");
        }
        if self.max_retry_count == 0 {
            return invalid("max_retry_count");
        }
        if self.backoff_base == 0 {
            return invalid("backoff_base");
        }
        if self.priority_decay_interval_secs == 0 {
            return invalid("priority_decay_interval_secs");
        }
        if self.bootstrap_page_size == 0 {
            return invalid("bootstrap_page_size");
        }

        Ok(())
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn priority_decay_interval(&self) -> Duration {
        Duration::from_secs(self.priority_decay_interval_secs)
    }
}
