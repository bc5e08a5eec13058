//! Shared vocabulary for the courier delivery-status engine
//!
//! Holds the persisted record shape, the status state machine values, the
//! transient [`StatusUpdate`] passed between engine stages, the clock
//! abstraction and the logging setup used by every other crate.

pub mod clock;
pub mod logging;
pub mod record;
pub mod status;

pub use chrono;
pub use tracing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{MessageRecord, RecordPatch};
pub use status::{MessageStatus, ParseStatusError, StatusUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
