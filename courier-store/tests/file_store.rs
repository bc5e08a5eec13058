#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;

use courier_common::{
    MessageRecord, MessageStatus, RecordPatch,
    chrono::{TimeDelta, Utc},
};
use courier_store::{FileRecordStore, RecordStore, StoreError};

fn store_in(dir: &tempfile::TempDir) -> FileRecordStore {
    let store = FileRecordStore::builder()
        .path(dir.path().join("records"))
        .build()
        .expect("valid path");
    store.init().expect("init");
    store
}

#[test]
fn test_path_validation_rejects_parent_dir() {
    let result = FileRecordStore::builder()
        .path(PathBuf::from("/var/lib/../etc/courier"))
        .build();

    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("cannot contain '..'")
    );
}

#[test]
fn test_path_validation_rejects_relative_paths() {
    let result = FileRecordStore::builder()
        .path(PathBuf::from("relative/path"))
        .build();

    assert!(result.unwrap_err().to_string().contains("must be absolute"));
}

#[test]
#[cfg(unix)]
fn test_path_validation_rejects_system_directories() {
    for path in ["/etc/courier", "/bin/records", "/proc/courier", "/dev/records"] {
        let result = FileRecordStore::builder().path(PathBuf::from(path)).build();

        assert!(
            result.unwrap_err().to_string().contains("system directory"),
            "Path {path} should be rejected"
        );
    }
}

#[test]
fn test_deserialize_validates_path() {
    let invalid = r#"(path: "/etc/courier")"#;
    let result: Result<FileRecordStore, _> = ron::from_str(invalid);
    assert!(result.is_err());

    let valid = r#"(path: "/var/lib/courier/records")"#;
    let result: Result<FileRecordStore, _> = ron::from_str(valid);
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_insert_get_update_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let now = Utc::now();

    store
        .insert(MessageRecord::sending("ext-1", "+15550001", now))
        .await
        .unwrap();

    let record = store.get("ext-1").await.unwrap();
    assert_eq!(record.status, MessageStatus::Sending);
    assert_eq!(record.destination_address, "+15550001");

    let patch = RecordPatch {
        error_code: Some("30003".to_string()),
        ..RecordPatch::status(MessageStatus::Failed)
    };
    let updated = store.update("ext-1", &patch).await.unwrap();
    assert_eq!(updated.status, MessageStatus::Failed);
    assert_eq!(updated.error_code.as_deref(), Some("30003"));
    assert_eq!(store.get("ext-1").await.unwrap(), updated);

    store.delete("ext-1").await.unwrap();
    assert!(matches!(
        store.get("ext-1").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.delete("ext-1").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_duplicate_insert_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let now = Utc::now();

    store
        .insert(MessageRecord::sending("dup", "+1", now))
        .await
        .unwrap();
    let result = store.insert(MessageRecord::sending("dup", "+2", now)).await;

    assert!(matches!(result, Err(StoreError::AlreadyExists(id)) if id == "dup"));
}

#[tokio::test]
async fn test_ids_with_path_separators_stay_inside_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store
        .insert(MessageRecord::sending("../../escape", "+1", Utc::now()))
        .await
        .unwrap();

    assert_eq!(
        store.get("../../escape").await.unwrap().external_id,
        "../../escape"
    );
    assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_list_pending_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now();

    {
        let store = store_in(&dir);
        for (i, status) in [
            MessageStatus::Sending,
            MessageStatus::Delivered,
            MessageStatus::Sending,
            MessageStatus::SendingStoppedQuerying,
        ]
        .into_iter()
        .enumerate()
        {
            let mut record = MessageRecord::sending(
                format!("ext-{i}"),
                "+1",
                base + TimeDelta::seconds(i64::try_from(i).unwrap()),
            );
            record.status = status;
            store.insert(record).await.unwrap();
        }
    }

    let reopened = store_in(&dir);
    let pending = reopened.list_pending(10, 15).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["ext-0", "ext-2"]);

    assert_eq!(reopened.list_pending(1, 15).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_record_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store
        .insert(MessageRecord::sending("good-1", "+1", Utc::now()))
        .await
        .unwrap();
    store
        .insert(MessageRecord::sending("good-2", "+1", Utc::now()))
        .await
        .unwrap();
    std::fs::write(store.path().join("6261642d31.bin"), b"\xff\xff not a record").unwrap();

    let pending = store.list_pending(10, 15).await.unwrap();
    let mut ids: Vec<_> = pending.iter().map(|r| r.external_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["good-1", "good-2"]);
    assert!(store.get("bad-1").await.is_err());
}

#[tokio::test]
async fn test_init_removes_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store
        .insert(MessageRecord::sending("kept", "+1", Utc::now()))
        .await
        .unwrap();
    std::fs::write(store.path().join(".tmp_abandoned.bin"), b"partial").unwrap();
    std::fs::write(store.path().join("gone.bin.deleted"), b"old").unwrap();

    store.init().unwrap();

    assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 1);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[test]
fn test_init_rejects_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"").unwrap();

    let store = FileRecordStore::builder().path(file).build().unwrap();
    assert!(matches!(store.init(), Err(StoreError::Validation(_))));
}
