use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use courier_common::{MessageRecord, RecordPatch, internal};
use serde::Deserialize;
use tokio::{fs, sync::Mutex};

use crate::{StoreError, ValidationError, r#trait::RecordStore};

const RECORD_EXTENSION: &str = ".bin";
const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";

/// File-based record store
///
/// Each record is a bincode file named after the hex encoding of its external
/// id, so arbitrary provider ids can never escape the store directory.
///
/// Writes go to `.tmp_{name}.bin` first and are renamed into place, so a crash
/// mid-write never leaves a torn record behind. Deletes rename to
/// `{name}.bin.deleted` before removing; leftovers from either step are swept
/// by [`FileRecordStore::init`].
///
/// Read-modify-write updates are serialised through an async mutex. The store
/// assumes it is the only process writing to its directory.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Default for FileRecordStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/courier/records"),
            write_lock: Mutex::new(()),
        }
    }
}

impl Clone for FileRecordStore {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            write_lock: Mutex::new(()),
        }
    }
}

// Validate the path while deserialising so a bad config fails at load time
impl<'de> Deserialize<'de> for FileRecordStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileRecordStoreHelper {
            path: PathBuf,
        }

        let helper = FileRecordStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self {
            path: helper.path,
            write_lock: Mutex::new(()),
        })
    }
}

impl FileRecordStore {
    /// Validate a store path
    ///
    /// Rejects `..` components, relative paths and system directories.
    ///
    /// # Errors
    /// Returns the first violated rule
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentComponent(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::SystemDirectory {
                    prefix: (*prefix).to_string(),
                    path: path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> FileRecordStoreBuilder {
        FileRecordStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepare the store directory
    ///
    /// Creates the directory if needed and removes temporary or half-deleted
    /// files left by a crash.
    ///
    /// # Errors
    /// - If the directory cannot be created or read
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising record store at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{:#?} does not exist, creating...", self.path);
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        self.cleanup_orphans()
    }

    fn cleanup_orphans(&self) -> crate::Result<()> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(DELETED_SUFFIX) || filename.starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from record store"
            );
        }

        Ok(())
    }

    fn filename(external_id: &str) -> String {
        format!("{}{RECORD_EXTENSION}", hex::encode(external_id.as_bytes()))
    }

    fn record_path(&self, external_id: &str) -> PathBuf {
        self.path.join(Self::filename(external_id))
    }

    async fn read_record(path: &Path) -> crate::Result<MessageRecord> {
        let bytes = fs::read(path).await?;
        let (record, _): (MessageRecord, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(record)
    }

    async fn write_record(&self, record: &MessageRecord) -> crate::Result<()> {
        let filename = Self::filename(&record.external_id);
        let final_path = self.path.join(&filename);
        let temp_path = self.path.join(format!("{TEMP_PREFIX}{filename}"));

        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    fn map_not_found(error: StoreError, external_id: &str) -> StoreError {
        match error {
            StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StoreError::NotFound(external_id.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    #[tracing::instrument(level = "debug", skip(self, record), fields(id = %record.external_id))]
    async fn insert(&self, record: MessageRecord) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;

        if fs::try_exists(self.record_path(&record.external_id)).await? {
            return Err(StoreError::AlreadyExists(record.external_id));
        }

        self.write_record(&record).await?;
        internal!(level = DEBUG, "Stored record {}", record.external_id);

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, external_id: &str) -> crate::Result<MessageRecord> {
        Self::read_record(&self.record_path(external_id))
            .await
            .map_err(|e| Self::map_not_found(e, external_id))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self) -> crate::Result<Vec<MessageRecord>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(RECORD_EXTENSION) && !filename.starts_with(TEMP_PREFIX) {
                match Self::read_record(&entry.path()).await {
                    Ok(record) => records.push(record),
                    // A record deleted between read_dir and read is simply gone
                    Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        internal!(
                            level = WARN,
                            "Skipping unreadable record file {}: {e}",
                            entry.path().display()
                        );
                    }
                }
            }
        }

        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        internal!(level = DEBUG, "Found {} records in store", records.len());

        Ok(records)
    }

    #[tracing::instrument(level = "debug", skip(self, patch))]
    async fn update(&self, external_id: &str, patch: &RecordPatch) -> crate::Result<MessageRecord> {
        let _guard = self.write_lock.lock().await;

        let mut record = self.get(external_id).await?;
        record.apply(patch);
        self.write_record(&record).await?;

        Ok(record)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, external_id: &str) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;

        let path = self.record_path(external_id);
        let deleted_path = self
            .path
            .join(format!("{}{DELETED_SUFFIX}", Self::filename(external_id)));

        fs::rename(&path, &deleted_path)
            .await
            .map_err(|e| Self::map_not_found(e.into(), external_id))?;
        fs::remove_file(&deleted_path).await?;

        internal!(level = DEBUG, "Deleted record {external_id}");

        Ok(())
    }
}

/// Builder for [`FileRecordStore`]
#[derive(Debug, Default)]
pub struct FileRecordStoreBuilder {
    path: PathBuf,
}

impl FileRecordStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// # Errors
    /// Returns an error if the path is invalid or points into a system directory
    pub fn build(self) -> crate::Result<FileRecordStore> {
        FileRecordStore::validate_path(&self.path)?;
        Ok(FileRecordStore {
            path: self.path,
            write_lock: Mutex::new(()),
        })
    }
}
