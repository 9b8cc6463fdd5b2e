//! post-pull - incremental social media post collection
//!
//! This library polls an API for new posts of tracked users, remembers a
//! per-user cursor so each pass only asks for newer posts, and stores the
//! collected posts in flat files or a document store.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod service;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PostPullError, Result};
pub use fetcher::{PostFetcher, PostSource};
pub use storage::Storage;
pub use types::{Post, StoredUserFeed, TrackedUser};
