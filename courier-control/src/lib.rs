//! Control protocol for managing a running courier instance
//!
//! Provides an IPC mechanism over a Unix domain socket to:
//! - Inspect the reconciliation queue and scheduler
//! - Trigger an immediate reconciliation pass
//! - Seed the queue from the record store
//!
//! Frames are length-prefixed bincode.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    PROTOCOL_VERSION, QueueCommand, Request, RequestCommand, Response, ResponseData,
    ResponsePayload, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/courier.sock";

/// Largest frame either side will accept
pub(crate) const MAX_FRAME_SIZE: u32 = 10_000_000;
