//! Per-user fetch, merge and cursor advancement

use std::sync::Arc;
use tracing::info;

use crate::error::{PostPullError, Result};
use crate::fetcher::PostFetcher;
use crate::storage::Storage;
use crate::types::{StoredUserFeed, TrackedUser};

/// What processing one user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The fetch came back empty; user and stored feed untouched
    NoNewPosts,
    /// New posts were merged into the stored feed and the cursor moved
    Updated {
        fetched: usize,
        appended: usize,
        since_id: String,
    },
}

pub struct UserProcessor {
    fetcher: PostFetcher,
    storage: Arc<dyn Storage>,
}

impl UserProcessor {
    pub fn new(fetcher: PostFetcher, storage: Arc<dyn Storage>) -> Self {
        Self { fetcher, storage }
    }

    /// Fetch posts newer than the user's cursor and fold them into its feed
    ///
    /// The feed is persisted before `user` is advanced; if persisting fails
    /// the user keeps its old cursor and the same range is fetched again on
    /// the next pass.
    pub async fn process_user(&self, user: &mut TrackedUser) -> Result<ProcessOutcome> {
        let new_posts = self
            .fetcher
            .fetch_posts(&user.user_name, user.since_id.as_deref())
            .await;

        if new_posts.is_empty() {
            info!("No new posts for {}", user.user_name);
            return Ok(ProcessOutcome::NoNewPosts);
        }

        let since_id = new_posts[0]
            .id()
            .ok_or_else(|| {
                PostPullError::InvalidInput(format!(
                    "newest post fetched for {} has no id",
                    user.user_name
                ))
            })?
            .to_string();
        let fetched = new_posts.len();

        let (feed, appended) = match self.storage.get_feed(&user.user_name).await? {
            Some(mut feed) => {
                let appended = feed.merge(since_id.clone(), new_posts);
                (feed, appended)
            }
            None => (
                StoredUserFeed::new(user.user_name.clone(), since_id.clone(), new_posts),
                fetched,
            ),
        };

        self.storage.put_feed(&feed).await?;
        info!(
            "Saved {} new posts for {} to {} storage",
            appended,
            user.user_name,
            self.storage.backend()
        );

        user.advance(since_id.clone());
        info!("Updated last_refresh and since_id for {}", user.user_name);

        Ok(ProcessOutcome::Updated {
            fetched,
            appended,
            since_id,
        })
    }
}
