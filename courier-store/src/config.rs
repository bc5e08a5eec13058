use std::sync::Arc;

use serde::Deserialize;

use crate::{
    backends::{FileRecordStore, MemoryRecordStore},
    r#trait::RecordStore,
};

/// Runtime selection of the record store backend
///
/// File-backed store in RON config:
/// ```ron
/// #![enable(unwrap_variant_newtypes)]
/// Courier (
///     store: File(
///         path: "/var/lib/courier/records",
///     ),
/// )
/// ```
///
/// Memory-backed store with a capacity limit:
/// ```ron
/// Courier (
///     store: Memory((capacity: Some(1000))),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    File(FileRecordStore),
    Memory(MemoryConfig),
}

/// Configuration for the memory-backed store
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryConfig {
    /// Maximum number of records to hold (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileRecordStore::default())
    }
}

impl StoreConfig {
    /// Filesystem path for file-backed stores
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory(_) => None,
        }
    }

    /// Build the configured store, preparing its directory if file-backed
    ///
    /// # Errors
    /// Returns an error if the file store directory cannot be initialised
    pub fn into_record_store(self) -> crate::Result<Arc<dyn RecordStore>> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory(config) => Ok(config.capacity.map_or_else(
                || Arc::new(MemoryRecordStore::new()) as Arc<dyn RecordStore>,
                |capacity| Arc::new(MemoryRecordStore::with_capacity(capacity)),
            )),
        }
    }
}
