//! Delivery-status reconciliation engine
//!
//! Tracks outbound messages whose final outcome is unknown and polls the
//! provider's status endpoint until each one is delivered, failed, or given
//! up on:
//! - Priority-ordered task queue with aging and exponential backoff
//! - Periodic passes with chunked concurrent queries and a reentrancy guard
//! - Persistence of every outcome to the record store
//! - Fan-out of terminal outcomes to subscribers
//! - Queue recovery from the record store

mod bootstrap;
mod client;
mod config;
mod error;
mod notifier;
pub mod policy;
pub mod queue;
mod reconciler;
pub mod scheduler;
mod service;
mod types;

pub use client::{HttpStatusClient, StatusClientConfig, StatusQuery};
pub use config::ReconcilerConfig;
pub use error::{QueryError, ReconcileError};
pub use notifier::{Notifier, Subscriber, Subscription};
pub use queue::{EnqueueOutcome, QueueStats, TaskQueue};
pub use reconciler::{Reconciler, Reconciliation};
pub use scheduler::{PassOutcome, PassReport, SchedulerState};
pub use service::{ReconcileQueryService, ReconcileService};
pub use types::ReconciliationTask;
