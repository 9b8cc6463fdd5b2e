//! Core types for post-pull

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A tracked account and its incremental-fetch cursor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedUser {
    pub user_name: String,
    #[serde(default)]
    pub last_refresh: Option<String>,
    #[serde(default)]
    pub since_id: Option<String>,
}

impl TrackedUser {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            last_refresh: None,
            since_id: None,
        }
    }

    /// Record a successful fetch whose newest post is `since_id`
    pub fn advance(&mut self, since_id: String) {
        self.last_refresh = Some(chrono::Utc::now().to_rfc3339());
        self.since_id = Some(since_id);
    }

    /// Handle without its leading `@`, as used for folder names and API lookups
    pub fn bare_handle(&self) -> &str {
        bare_handle(&self.user_name)
    }
}

pub fn bare_handle(user_name: &str) -> &str {
    user_name.trim_start_matches('@')
}

/// On-disk shape of the roster file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roster {
    pub users: Vec<TrackedUser>,
}

impl Roster {
    /// Insert or update each user by `user_name`, keeping unknown entries in place
    pub fn upsert_all(&mut self, users: &[TrackedUser]) {
        for user in users {
            match self
                .users
                .iter_mut()
                .find(|existing| existing.user_name == user.user_name)
            {
                Some(existing) => {
                    existing.last_refresh = user.last_refresh.clone();
                    existing.since_id = user.since_id.clone();
                }
                None => self.users.push(user.clone()),
            }
        }
    }
}

/// A post as returned by the API
///
/// The payload is kept verbatim; only `id` is ever inspected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Post(pub Value);

impl Post {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for Post {
    fn from(value: Value) -> Self {
        Post(value)
    }
}

/// Every post collected for one user plus the cursor of the latest batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredUserFeed {
    pub user_name: String,
    pub since_id: String,
    #[serde(default)]
    pub post_list: Vec<Post>,
}

impl StoredUserFeed {
    /// Start a feed from a first batch; `since_id` is the id of its first post
    pub fn new(user_name: impl Into<String>, since_id: String, batch: Vec<Post>) -> Self {
        Self {
            user_name: user_name.into(),
            since_id,
            post_list: batch,
        }
    }

    /// Append a newer batch after the existing posts and move the cursor
    ///
    /// Posts whose id is already stored are skipped, so re-fetching an
    /// overlapping range after an interrupted pass does not duplicate them.
    /// Returns the number of posts actually appended.
    pub fn merge(&mut self, since_id: String, batch: Vec<Post>) -> usize {
        let known: HashSet<String> = self
            .post_list
            .iter()
            .filter_map(|p| p.id().map(str::to_string))
            .collect();

        let before = self.post_list.len();
        self.post_list.extend(
            batch
                .into_iter()
                .filter(|p| p.id().map_or(true, |id| !known.contains(id))),
        );
        self.since_id = since_id;
        self.post_list.len() - before
    }
}
