//! Pure scheduling policies.
//!
//! - [`priority`]: how urgent a task is, from its age and retry count
//! - [`RetryPolicy`]: when a task may be queried again and when to give up

pub mod priority;
pub mod retry;

pub use priority::{PriorityPolicy, compute_priority};
pub use retry::RetryPolicy;
