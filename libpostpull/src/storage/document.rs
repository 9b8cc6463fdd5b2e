//! Document-store backend
//!
//! Roster entries live in the `channels` collection and stored feeds in
//! `raw_data`, one document per user keyed by `user_name`. The collections
//! are reached through [`DocumentCollection`], implemented over MongoDB by
//! [`MongoCollection`] and in memory by
//! [`MemoryCollection`](crate::storage::memory::MemoryCollection).

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::MongoSettings;
use crate::error::{Result, StorageError};
use crate::storage::file::read_roster_file;
use crate::storage::{Storage, CHANNELS_COLLECTION, RAW_DATA_COLLECTION};
use crate::types::{StoredUserFeed, TrackedUser};

/// Documents addressed by their `user_name`
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for TrackedUser {
    fn key(&self) -> &str {
        &self.user_name
    }
}

impl Keyed for StoredUserFeed {
    fn key(&self) -> &str {
        &self.user_name
    }
}

/// A collection of documents keyed by `user_name`
#[async_trait]
pub trait DocumentCollection<T: Send + Sync>: Send + Sync {
    /// Every document, in natural order
    async fn find_all(&self) -> Result<Vec<T>>;

    async fn find_by_key(&self, key: &str) -> Result<Option<T>>;

    /// Insert the document, or overwrite its fields if the key exists
    async fn upsert(&self, item: &T) -> Result<()>;

    /// Insert only when the key is absent; returns whether it was inserted
    async fn insert_if_absent(&self, item: &T) -> Result<bool>;
}

/// [`DocumentCollection`] over a MongoDB collection
pub struct MongoCollection<T: Send + Sync> {
    inner: mongodb::Collection<T>,
}

impl<T: Send + Sync> MongoCollection<T> {
    pub fn new(inner: mongodb::Collection<T>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T> DocumentCollection<T> for MongoCollection<T>
where
    T: Keyed + Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    async fn find_all(&self) -> Result<Vec<T>> {
        let cursor = self
            .inner
            .find(doc! {})
            .await
            .map_err(StorageError::Document)?;
        let items: Vec<T> = cursor.try_collect().await.map_err(StorageError::Document)?;
        Ok(items)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>> {
        let found = self
            .inner
            .find_one(doc! { "user_name": key })
            .await
            .map_err(StorageError::Document)?;
        Ok(found)
    }

    async fn upsert(&self, item: &T) -> Result<()> {
        let fields = mongodb::bson::to_document(item).map_err(StorageError::Encode)?;
        self.inner
            .update_one(doc! { "user_name": item.key() }, doc! { "$set": fields })
            .upsert(true)
            .await
            .map_err(StorageError::Document)?;
        Ok(())
    }

    async fn insert_if_absent(&self, item: &T) -> Result<bool> {
        if self.find_by_key(item.key()).await?.is_some() {
            return Ok(false);
        }
        self.inner
            .insert_one(item)
            .await
            .map_err(StorageError::Document)?;
        Ok(true)
    }
}

pub struct DocumentStorage {
    channels: Box<dyn DocumentCollection<TrackedUser>>,
    raw_data: Box<dyn DocumentCollection<StoredUserFeed>>,
}

impl DocumentStorage {
    pub fn new(
        channels: Box<dyn DocumentCollection<TrackedUser>>,
        raw_data: Box<dyn DocumentCollection<StoredUserFeed>>,
    ) -> Self {
        Self { channels, raw_data }
    }

    /// Connect to MongoDB and check the server answers
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let client = mongodb::Client::with_uri_str(&settings.uri)
            .await
            .map_err(StorageError::Document)?;
        let db = client.database(&settings.db_name);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(StorageError::Document)?;

        Ok(Self::new(
            Box::new(MongoCollection::new(
                db.collection::<TrackedUser>(CHANNELS_COLLECTION),
            )),
            Box::new(MongoCollection::new(
                db.collection::<StoredUserFeed>(RAW_DATA_COLLECTION),
            )),
        ))
    }
}

#[async_trait]
impl Storage for DocumentStorage {
    fn backend(&self) -> &str {
        "document"
    }

    async fn load_users(&self) -> Result<Vec<TrackedUser>> {
        let users = self.channels.find_all().await?;
        info!("Loaded {} users from the document store", users.len());
        Ok(users)
    }

    async fn save_users(&self, users: &[TrackedUser]) -> Result<()> {
        for user in users {
            self.channels.upsert(user).await?;
        }
        info!("Saved {} users to the document store", users.len());
        Ok(())
    }

    async fn get_feed(&self, user_name: &str) -> Result<Option<StoredUserFeed>> {
        self.raw_data.find_by_key(user_name).await
    }

    async fn put_feed(&self, feed: &StoredUserFeed) -> Result<()> {
        self.raw_data.upsert(feed).await?;
        debug!(user = %feed.user_name, posts = feed.post_list.len(), "Upserted stored feed");
        Ok(())
    }

    async fn import_roster(&self, roster_path: &Path) -> Result<usize> {
        let roster = read_roster_file(roster_path)?;

        let mut inserted = 0;
        for user in &roster.users {
            if self.channels.insert_if_absent(user).await? {
                info!("Inserted {} into the document store", user.user_name);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
