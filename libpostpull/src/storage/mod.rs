//! Persistence for the roster and the per-user stored feeds
//!
//! Two interchangeable backends implement [`Storage`]:
//!
//! - [`file::FileStorage`]: a JSON roster file plus one JSON feed file per
//!   user under the output folder
//! - [`document::DocumentStorage`]: `channels` and `raw_data` collections in a
//!   document store, one document per user keyed by `user_name`
//!
//! The backend is chosen once, from configuration, by [`open`]. Everything
//! above this module works against `dyn Storage` only.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::types::{StoredUserFeed, TrackedUser};

pub mod document;
pub mod file;
pub mod memory;

/// Name of the collection holding roster entries
pub const CHANNELS_COLLECTION: &str = "channels";

/// Name of the collection holding stored feeds
pub const RAW_DATA_COLLECTION: &str = "raw_data";

/// Backend-agnostic persistence contract
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short identifier used in log lines ("file", "document")
    fn backend(&self) -> &str;

    /// Load the full roster
    async fn load_users(&self) -> Result<Vec<TrackedUser>>;

    /// Persist cursor and refresh state for every given user
    ///
    /// Upsert by `user_name`: unknown handles are inserted, known ones updated.
    async fn save_users(&self, users: &[TrackedUser]) -> Result<()>;

    /// Load the stored feed for `user_name`, if one exists
    async fn get_feed(&self, user_name: &str) -> Result<Option<StoredUserFeed>>;

    /// Create or overwrite the stored feed for `feed.user_name`
    async fn put_feed(&self, feed: &StoredUserFeed) -> Result<()>;

    /// Copy roster entries from a flat roster file into this backend
    ///
    /// Only handles not already present are inserted, so running it on
    /// every startup is safe. Returns the number of inserted users.
    async fn import_roster(&self, _roster_path: &Path) -> Result<usize> {
        Ok(0)
    }
}

/// Open the backend selected by `use_mongodb`
pub async fn open(config: &Config) -> Result<Arc<dyn Storage>> {
    if config.use_mongodb {
        let settings = config.mongo_settings()?;
        let storage = document::DocumentStorage::connect(&settings).await?;
        info!(db = %settings.db_name, "Using document store backend");
        Ok(Arc::new(storage))
    } else {
        let storage = file::FileStorage::new(config.roster_path(), config.output_folder())?;
        info!(
            roster = %config.roster_path().display(),
            output = %config.output_folder().display(),
            "Using file backend"
        );
        Ok(Arc::new(storage))
    }
}
