//! In-memory document collections
//!
//! Stand-in for the document store in tests. Clones share the
//! same underlying documents, so a test can keep a handle while the storage
//! owns another.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::storage::document::{DocumentCollection, DocumentStorage, Keyed};
use crate::types::{StoredUserFeed, TrackedUser};

#[derive(Clone)]
pub struct MemoryCollection<T> {
    documents: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self {
            documents: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> MemoryCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored document
    pub fn documents(&self) -> Vec<T> {
        self.documents.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T> DocumentCollection<T> for MemoryCollection<T>
where
    T: Keyed + Clone + Send + Sync,
{
    async fn find_all(&self) -> Result<Vec<T>> {
        Ok(self.documents())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .find(|doc| doc.key() == key)
            .cloned())
    }

    async fn upsert(&self, item: &T) -> Result<()> {
        let mut documents = self.documents.lock().unwrap();
        match documents.iter_mut().find(|doc| doc.key() == item.key()) {
            Some(existing) => *existing = item.clone(),
            None => documents.push(item.clone()),
        }
        Ok(())
    }

    async fn insert_if_absent(&self, item: &T) -> Result<bool> {
        let mut documents = self.documents.lock().unwrap();
        if documents.iter().any(|doc| doc.key() == item.key()) {
            return Ok(false);
        }
        documents.push(item.clone());
        Ok(true)
    }
}

impl DocumentStorage {
    /// Document storage backed by the given in-memory collections
    pub fn in_memory(
        channels: MemoryCollection<TrackedUser>,
        raw_data: MemoryCollection<StoredUserFeed>,
    ) -> Self {
        Self::new(Box::new(channels), Box::new(raw_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::types::Post;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (
        DocumentStorage,
        MemoryCollection<TrackedUser>,
        MemoryCollection<StoredUserFeed>,
    ) {
        let channels = MemoryCollection::new();
        let raw_data = MemoryCollection::new();
        let storage = DocumentStorage::in_memory(channels.clone(), raw_data.clone());
        (storage, channels, raw_data)
    }

    #[tokio::test]
    async fn test_save_users_upserts_by_user_name() {
        let (storage, channels, _) = setup();
        storage
            .save_users(&[TrackedUser::new("@a"), TrackedUser::new("@b")])
            .await
            .unwrap();

        let mut a = TrackedUser::new("@a");
        a.advance("12".to_string());
        storage.save_users(&[a.clone()]).await.unwrap();

        assert_eq!(channels.len(), 2);
        assert_eq!(storage.load_users().await.unwrap()[0], a);
    }

    #[tokio::test]
    async fn test_feed_upsert_replaces_document() {
        let (storage, _, raw_data) = setup();
        let mut feed = StoredUserFeed::new("@a", "1".to_string(), vec![Post(json!({ "id": "1" }))]);
        storage.put_feed(&feed).await.unwrap();

        feed.merge("2".to_string(), vec![Post(json!({ "id": "2" }))]);
        storage.put_feed(&feed).await.unwrap();

        assert_eq!(raw_data.len(), 1);
        assert_eq!(storage.get_feed("@a").await.unwrap(), Some(feed));
        assert!(storage.get_feed("@b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_roster_skips_existing_handles() {
        let dir = TempDir::new().unwrap();
        let roster_path = dir.path().join("x_users.json");
        std::fs::write(
            &roster_path,
            r#"{ "users": [
                { "user_name": "@a", "last_refresh": null, "since_id": null },
                { "user_name": "@b", "last_refresh": null, "since_id": null }
            ] }"#,
        )
        .unwrap();

        let (storage, channels, _) = setup();
        let mut existing = TrackedUser::new("@a");
        existing.since_id = Some("77".to_string());
        storage.save_users(&[existing.clone()]).await.unwrap();

        let inserted = storage.import_roster(&roster_path).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(channels.len(), 2);
        // The stored cursor wins over the file's null cursor
        assert_eq!(channels.documents()[0], existing);
    }

    #[tokio::test]
    async fn test_import_roster_missing_file_is_error() {
        let (storage, channels, _) = setup();
        let result = storage
            .import_roster(std::path::Path::new("/nonexistent/x_users.json"))
            .await;
        assert!(result.is_err());
        assert!(channels.is_empty());
    }
}
