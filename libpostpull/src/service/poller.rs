//! The poll loop: one pass over the roster, persist, sleep, repeat

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::service::processor::{ProcessOutcome, UserProcessor};
use crate::storage::Storage;

/// Tally of one pass over the roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub users: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub new_posts: usize,
}

pub struct Poller {
    storage: Arc<dyn Storage>,
    processor: UserProcessor,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Poller {
    pub fn new(storage: Arc<dyn Storage>, processor: UserProcessor, interval: Duration) -> Self {
        Self {
            storage,
            processor,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop after the current user when `flag` becomes true
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Run passes until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping poll loop");
                break;
            }

            if let Err(e) = self.run_pass().await {
                error!("Error during pass: {}", e);
            }

            info!("Sleeping for {} seconds...", self.interval.as_secs_f64());
            self.sleep_interval().await;
        }

        Ok(())
    }

    /// Process every user once, in roster order, then save the roster
    ///
    /// A failure on one user is logged and the pass moves on. Users already
    /// processed are saved even when shutdown cuts the pass short.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let mut users = self.storage.load_users().await?;
        let mut summary = PassSummary {
            users: users.len(),
            ..Default::default()
        };

        for user in users.iter_mut() {
            if self.shutdown_requested() {
                warn!("Shutdown requested, ending pass before {}", user.user_name);
                break;
            }

            match self.processor.process_user(user).await {
                Ok(ProcessOutcome::Updated { appended, .. }) => {
                    summary.updated += 1;
                    summary.new_posts += appended;
                }
                Ok(ProcessOutcome::NoNewPosts) => summary.unchanged += 1,
                Err(e) => {
                    error!("Failed to process {}: {}", user.user_name, e);
                    summary.failed += 1;
                }
            }
        }

        self.storage.save_users(&users).await?;
        info!(
            users = summary.users,
            updated = summary.updated,
            unchanged = summary.unchanged,
            failed = summary.failed,
            new_posts = summary.new_posts,
            "Pass complete"
        );
        Ok(summary)
    }

    /// Sleep for the interval, checking for shutdown every second
    async fn sleep_interval(&self) {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.shutdown_requested() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep((deadline - now).min(Duration::from_secs(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::MockSource;
    use crate::fetcher::PostFetcher;
    use crate::storage::document::{DocumentCollection, DocumentStorage};
    use crate::storage::memory::MemoryCollection;
    use crate::types::{Post, TrackedUser};
    use serde_json::json;

    async fn poller_with(
        source: &MockSource,
        users: &[&str],
    ) -> (Poller, MemoryCollection<TrackedUser>) {
        let channels = MemoryCollection::new();
        for name in users {
            channels.upsert(&TrackedUser::new(*name)).await.unwrap();
        }
        let storage: Arc<dyn Storage> =
            Arc::new(DocumentStorage::in_memory(channels.clone(), MemoryCollection::new()));
        let processor = UserProcessor::new(
            PostFetcher::new(Box::new(source.clone()), 100),
            storage.clone(),
        );
        (
            Poller::new(storage, processor, Duration::from_secs(60)),
            channels,
        )
    }

    #[tokio::test]
    async fn test_pass_processes_users_in_roster_order() {
        let source = MockSource::new();
        source.push_batch("@b", vec![Post(json!({ "id": "3" }))]);
        let (poller, channels) = poller_with(&source, &["@a", "@b", "@c"]).await;

        let summary = poller.run_pass().await.unwrap();

        assert_eq!(source.lookup_calls(), vec!["a", "b", "c"]);
        assert_eq!(
            summary,
            PassSummary {
                users: 3,
                updated: 1,
                unchanged: 2,
                failed: 0,
                new_posts: 1,
            }
        );
        let saved = channels.documents();
        assert_eq!(saved[1].since_id.as_deref(), Some("3"));
        assert!(saved[0].since_id.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_before_pass_skips_users_but_saves() {
        let source = MockSource::new();
        let (poller, channels) = poller_with(&source, &["@a"]).await;
        let flag = Arc::new(AtomicBool::new(true));
        let poller = poller.with_shutdown(flag);

        let summary = poller.run_pass().await.unwrap();
        assert_eq!(summary.users, 1);
        assert_eq!(summary.updated + summary.unchanged + summary.failed, 0);
        assert!(source.lookup_calls().is_empty());
        assert_eq!(channels.len(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_once_shutdown_is_set() {
        let source = MockSource::new();
        let (poller, _) = poller_with(&source, &["@a"]).await;
        let poller = poller.with_shutdown(Arc::new(AtomicBool::new(true)));

        poller.run().await.unwrap();
        assert!(source.lookup_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_repeats_after_interval() {
        let source = MockSource::new();
        let (poller, _) = poller_with(&source, &["@a"]).await;
        let flag = Arc::new(AtomicBool::new(false));
        let poller = Arc::new(poller.with_shutdown(flag.clone()));

        let task = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.run().await })
        };

        // First pass runs immediately, second after the 60s interval
        tokio::time::sleep(Duration::from_secs(90)).await;
        flag.store(true, Ordering::Relaxed);
        task.await.unwrap().unwrap();

        assert_eq!(source.lookup_calls(), vec!["a", "a"]);
    }
}
