//! Post fetching with rate-limit aware retries
//!
//! A [`PostSource`] is the thin API client: it resolves handles and returns
//! one page of posts, surfacing every failure as a [`FetchError`]. The
//! [`PostFetcher`] wraps a source with the policy the poll loop relies on:
//!
//! - rate-limit responses are waited out and the identical request is retried,
//!   for as long as the API keeps asking us to back off
//! - any other failure is logged and turned into an empty batch, so the user
//!   is simply tried again on the next pass
//!
//! # Examples
//!
//! ```no_run
//! use libpostpull::fetcher::{mock::MockSource, PostFetcher};
//!
//! # async fn example() {
//! let fetcher = PostFetcher::new(Box::new(MockSource::new()), 100);
//! let posts = fetcher.fetch_posts("@rustlang", Some("1790")).await;
//! println!("{} new posts", posts.len());
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::types::{bare_handle, Post};

pub mod mock;
pub mod twitter;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Wait applied when a rate-limit response carries no usable reset time
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

/// Fields requested for every post
pub const TWEET_FIELDS: &str = "created_at,public_metrics,entities";

/// Timeline entries left out of every page
pub const EXCLUDE: &str = "retweets,replies";

/// Page sizes the timeline endpoint accepts
pub const MIN_PAGE_SIZE: u32 = 5;
pub const MAX_PAGE_SIZE: u32 = 100;

/// One page request against a user's timeline
///
/// Built once per fetch and reused verbatim for every rate-limit retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRequest {
    pub user_id: String,
    pub max_results: u32,
    pub since_id: Option<String>,
}

impl TimelineRequest {
    pub fn new(user_id: impl Into<String>, max_results: u32, since_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.into(),
            max_results: max_results.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE),
            since_id: since_id.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Query string parameters, newest-first is the endpoint's natural order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("exclude", EXCLUDE.to_string()),
            ("max_results", self.max_results.to_string()),
        ];
        if let Some(since_id) = &self.since_id {
            pairs.push(("since_id", since_id.clone()));
        }
        pairs
    }
}

/// Remote API surface consumed by the fetcher
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Short identifier used in log lines (e.g. "twitter", "mock")
    fn name(&self) -> &str;

    /// Resolve a bare handle (no leading `@`) to the platform's stable user id
    async fn resolve_user_id(&self, handle: &str) -> FetchResult<String>;

    /// Fetch one page of posts, newest first
    async fn user_posts(&self, request: &TimelineRequest) -> FetchResult<Vec<Post>>;
}

/// Fetches new posts for a handle, absorbing rate limits and failures
pub struct PostFetcher {
    source: Box<dyn PostSource>,
    max_results: u32,
}

impl PostFetcher {
    pub fn new(source: Box<dyn PostSource>, max_results: u32) -> Self {
        Self {
            source,
            max_results,
        }
    }

    /// Fetch posts newer than `since_id` for `user_name`
    ///
    /// Never fails: errors other than rate limiting are logged and yield an
    /// empty batch.
    pub async fn fetch_posts(&self, user_name: &str, since_id: Option<&str>) -> Vec<Post> {
        match self.try_fetch_posts(user_name, since_id).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(user = %user_name, source = self.source.name(), "An error occurred: {}", e);
                Vec::new()
            }
        }
    }

    /// Same as [`fetch_posts`](Self::fetch_posts) but surfaces non rate-limit errors
    pub async fn try_fetch_posts(
        &self,
        user_name: &str,
        since_id: Option<&str>,
    ) -> FetchResult<Vec<Post>> {
        let handle = bare_handle(user_name);
        let user_id = retry_rate_limited("user lookup", || self.source.resolve_user_id(handle)).await?;

        let request = TimelineRequest::new(user_id, self.max_results, since_id);
        debug!(user = %user_name, ?request, "Requesting timeline page");

        retry_rate_limited("timeline", || self.source.user_posts(&request)).await
    }
}

/// Run `call` until it returns anything other than a rate-limit error
async fn retry_rate_limited<T, F, Fut>(operation: &str, mut call: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match call().await {
            Err(FetchError::RateLimit { reset_at }) => {
                let wait = rate_limit_wait(reset_at, Utc::now());
                warn!(
                    "Rate limit exceeded on {} (attempt {}): Too Many Requests",
                    operation, attempt
                );
                info!(
                    "Waiting for {} before retrying...",
                    humantime::format_duration(wait)
                );
                sleep(wait).await;
                attempt += 1;
            }
            other => {
                if attempt > 1 {
                    info!("{} went through after {} attempts", operation, attempt);
                }
                return other;
            }
        }
    }
}

/// How long to back off given the limiter's reset time
pub fn rate_limit_wait(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    match reset_at {
        Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
        None => DEFAULT_RATE_LIMIT_WAIT,
    }
}
