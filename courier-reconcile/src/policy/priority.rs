//! Priority aging.
//!
//! Fresh tasks start at [`MIN_PRIORITY`] and drift towards [`MAX_PRIORITY`]
//! as they age and fail, so new work is serviced first without old work ever
//! falling off the end of the queue.

use std::time::Duration;

use courier_common::chrono::TimeDelta;

/// Most urgent priority value
pub const MIN_PRIORITY: u8 = 1;

/// Least urgent priority value
pub const MAX_PRIORITY: u8 = 10;

/// Priority of a task `age_ms` old that has been retried `retry_count` times
///
/// `1 + floor(age_ms / decay_interval_ms) + retry_count`, capped at
/// [`MAX_PRIORITY`]. A zero decay interval disables aging.
#[must_use]
pub fn compute_priority(age_ms: u64, retry_count: u32, decay_interval_ms: u64) -> u8 {
    let aged = age_ms.checked_div(decay_interval_ms).unwrap_or(0);
    let raw = u64::from(MIN_PRIORITY)
        .saturating_add(aged)
        .saturating_add(u64::from(retry_count));

    u8::try_from(raw.min(u64::from(MAX_PRIORITY))).unwrap_or(MAX_PRIORITY)
}

/// [`compute_priority`] bound to a configured decay interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityPolicy {
    pub decay_interval: Duration,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            decay_interval: Duration::from_secs(300),
        }
    }
}

impl PriorityPolicy {
    #[must_use]
    pub const fn new(decay_interval: Duration) -> Self {
        Self { decay_interval }
    }

    /// Priority for a task of the given age; negative ages count as zero
    #[must_use]
    pub fn compute(&self, age: TimeDelta, retry_count: u32) -> u8 {
        let age_ms = u64::try_from(age.num_milliseconds()).unwrap_or(0);
        let decay_ms = u64::try_from(self.decay_interval.as_millis()).unwrap_or(u64::MAX);
        compute_priority(age_ms, retry_count, decay_ms)
    }
}
