//! Persistent record store for outbound message state
//!
//! The reconciliation engine only needs a narrow slice of a message store:
//! list the records still awaiting a final status, read one record, and
//! update its status-related fields. [`RecordStore`] captures exactly that,
//! with an in-memory backend for tests and development and a file-backed
//! backend for single-node deployments.

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

pub use backends::{FileRecordStore, MemoryRecordStore};
pub use config::{MemoryConfig, StoreConfig};
pub use error::{Result, SerializationError, StoreError, ValidationError};
pub use r#trait::RecordStore;
