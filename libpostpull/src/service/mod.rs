//! Service layer for post-pull
//!
//! - `UserProcessor`: fetch, merge and cursor advancement for one user
//! - `Poller`: passes over the whole roster on a fixed interval
//!
//! # Example
//!
//! ```no_run
//! use libpostpull::fetcher::twitter::TwitterClient;
//! use libpostpull::{service, storage, Config};
//!
//! # async fn example() -> libpostpull::Result<()> {
//! let config = Config::load()?;
//! let storage = storage::open(&config).await?;
//! service::import_roster(storage.as_ref(), &config.roster_path()).await;
//!
//! let client = TwitterClient::from_config(&config)?;
//! let poller = service::build_poller(&config, storage, Box::new(client));
//! poller.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod poller;
pub mod processor;

pub use poller::{PassSummary, Poller};
pub use processor::{ProcessOutcome, UserProcessor};

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::fetcher::{PostFetcher, PostSource};
use crate::storage::Storage;

/// Wire a poller from configuration around an already opened backend
pub fn build_poller(config: &Config, storage: Arc<dyn Storage>, source: Box<dyn PostSource>) -> Poller {
    let fetcher = PostFetcher::new(source, config.max_results);
    let processor = UserProcessor::new(fetcher, storage.clone());
    Poller::new(storage, processor, config.execution_interval())
}

/// Copy the flat roster into the backend, logging instead of failing
///
/// Returns the number of inserted users; zero when the import failed.
pub async fn import_roster(storage: &dyn Storage, roster_path: &Path) -> usize {
    match storage.import_roster(roster_path).await {
        Ok(inserted) => {
            if inserted > 0 {
                info!(
                    "Imported {} users from {}",
                    inserted,
                    roster_path.display()
                );
            }
            inserted
        }
        Err(e) => {
            error!("Failed to load users from JSON file: {}", e);
            0
        }
    }
}
