pub mod file;
pub mod memory;

pub use file::{FileRecordStore, FileRecordStoreBuilder};
pub use memory::MemoryRecordStore;
