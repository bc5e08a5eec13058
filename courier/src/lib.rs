//! Composition root for the courier daemon
//!
//! Wires the record store, the HTTP status client, the reconciliation engine
//! and the control socket together from a single RON configuration.

pub mod control_handler;
pub mod controller;

pub use controller::{Courier, CourierRuntime, SHUTDOWN_BROADCAST};
