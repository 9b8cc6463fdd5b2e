//! post-pull - Daemon that collects new posts of tracked accounts
//!
//! Loads the roster, fetches posts newer than each user's cursor, appends
//! them to the stored feed and sleeps until the next pass.

use clap::Parser;
use libpostpull::fetcher::twitter::TwitterClient;
use libpostpull::logging::{self, Logging};
use libpostpull::{service, storage, Config, PostPullError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "post-pull")]
#[command(version)]
#[command(about = "Daemon that collects new posts of tracked accounts")]
#[command(long_about = "\
post-pull - Daemon that collects new posts of tracked accounts

DESCRIPTION:
    post-pull is a long-running daemon that polls the X/Twitter API for
    new posts of every account in its roster.

    Each pass asks only for posts newer than the last one seen for a user,
    appends them to that user's stored feed and remembers the new cursor.
    Rate limits are waited out; other failures are logged and the user is
    tried again on the next pass.

USAGE:
    # Run in foreground (logs to stderr)
    post-pull

    # Use a specific configuration file
    post-pull --config ./config.json

    # Run a single pass and exit
    post-pull --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes current user)

CONFIGURATION:
    Configuration file: $POSTPULL_CONFIG, ./config.json or
    ~/.config/post-pull/config.json

    {
        \"output_folder_path\": \"output\",
        \"execution_interval_ms\": 900000,
        \"log_file_path\": \"logs/post-pull.log\",
        \"use_mongodb\": false,
        \"mongodb_uri\": \"mongodb://localhost:27017\",
        \"mongodb_db_name\": \"post_pull\"
    }

    The API bearer token is read from TWITTER_BEARER_TOKEN (or a .env file).

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "POSTPULL_CONFIG")]
    config: Option<PathBuf>,

    /// Interval between passes in milliseconds (overrides config)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Do not import the roster file into the document store at startup
    #[arg(long)]
    skip_import: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = start(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Load configuration and logging, then run; the log guard lives until return
async fn start(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(interval_ms) = cli.interval_ms {
        config.execution_interval_ms = interval_ms;
    }

    let _logging = init_logging(cli.verbose, &config)?;

    let result = run(&cli, &config).await;
    if let Err(e) = &result {
        error!("post-pull stopped: {}", e);
    }
    result
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn init_logging(verbose: bool, config: &Config) -> Result<Logging> {
    let mut logging_config = logging::config_from_env(verbose);
    if let Some(path) = config.log_file() {
        logging_config = logging_config.with_log_file(path);
    }

    let logging = logging_config
        .build()
        .map_err(|e| PostPullError::Startup(format!("Logging setup failed: {}", e)))?;
    logging
        .install()
        .map_err(|e| PostPullError::Startup(format!("Logging setup failed: {}", e)))?;
    Ok(logging)
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    info!("post-pull daemon starting");

    let storage = storage::open(config).await?;
    if config.use_mongodb && !cli.skip_import {
        service::import_roster(storage.as_ref(), &config.roster_path()).await;
    }

    let client = TwitterClient::from_config(config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poller = service::build_poller(config, storage, Box::new(client)).with_shutdown(shutdown);

    if cli.once {
        let summary = poller.run_pass().await?;
        info!(
            "post-pull: processed {} users once ({} new posts), exiting",
            summary.users, summary.new_posts
        );
    } else {
        info!("Poll interval: {}ms", config.execution_interval_ms);
        poller.run().await?;
    }

    info!("post-pull daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| PostPullError::Startup(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
