//! Importing the flat roster into the document backend

use libpostpull::service;
use libpostpull::storage::document::{DocumentCollection, DocumentStorage};
use libpostpull::storage::file::FileStorage;
use libpostpull::storage::memory::MemoryCollection;
use libpostpull::{Storage, StoredUserFeed, TrackedUser};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_roster(dir: &Path) -> PathBuf {
    let path = dir.join("x_users.json");
    fs::write(
        &path,
        r#"{
    "users": [
        { "user_name": "@alice", "last_refresh": null, "since_id": null },
        { "user_name": "@bob", "last_refresh": "2024-05-01T12:00:00", "since_id": "41" },
        { "user_name": "@carol" }
    ]
}"#,
    )
    .unwrap();
    path
}

fn document_storage() -> (DocumentStorage, MemoryCollection<TrackedUser>) {
    let channels = MemoryCollection::new();
    let storage =
        DocumentStorage::in_memory(channels.clone(), MemoryCollection::<StoredUserFeed>::new());
    (storage, channels)
}

#[tokio::test]
async fn test_import_twice_keeps_one_document_per_handle() {
    let dir = TempDir::new().unwrap();
    let roster_path = write_roster(dir.path());
    let (storage, channels) = document_storage();

    assert_eq!(service::import_roster(&storage, &roster_path).await, 3);
    assert_eq!(service::import_roster(&storage, &roster_path).await, 0);

    let names: Vec<_> = channels
        .documents()
        .into_iter()
        .map(|u| u.user_name)
        .collect();
    assert_eq!(names, vec!["@alice", "@bob", "@carol"]);
}

#[tokio::test]
async fn test_import_carries_cursor_from_file() {
    let dir = TempDir::new().unwrap();
    let roster_path = write_roster(dir.path());
    let (storage, _) = document_storage();

    service::import_roster(&storage, &roster_path).await;

    let users = storage.load_users().await.unwrap();
    assert_eq!(users[1].since_id.as_deref(), Some("41"));
    assert_eq!(users[1].last_refresh.as_deref(), Some("2024-05-01T12:00:00"));
    assert_eq!(users[2], TrackedUser::new("@carol"));
}

#[tokio::test]
async fn test_import_does_not_reset_advanced_users() {
    let dir = TempDir::new().unwrap();
    let roster_path = write_roster(dir.path());
    let (storage, channels) = document_storage();

    let mut alice = TrackedUser::new("@alice");
    alice.advance("99".to_string());
    channels.upsert(&alice).await.unwrap();

    assert_eq!(service::import_roster(&storage, &roster_path).await, 2);
    assert_eq!(storage.load_users().await.unwrap()[0], alice);
}

#[tokio::test]
async fn test_import_failure_is_swallowed() {
    let dir = TempDir::new().unwrap();
    let (storage, channels) = document_storage();

    let missing = dir.path().join("x_users.json");
    assert_eq!(service::import_roster(&storage, &missing).await, 0);

    fs::write(&missing, "{ not json").unwrap();
    assert_eq!(service::import_roster(&storage, &missing).await, 0);
    assert!(channels.is_empty());
}

#[tokio::test]
async fn test_file_backend_import_is_noop() {
    let dir = TempDir::new().unwrap();
    let roster_path = write_roster(dir.path());
    let storage = FileStorage::new(&roster_path, dir.path().join("output")).unwrap();

    assert_eq!(service::import_roster(&storage, &roster_path).await, 0);
    assert_eq!(storage.load_users().await.unwrap().len(), 3);
}
