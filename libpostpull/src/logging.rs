//! Logging setup for the post-pull daemon
//!
//! Builds a `tracing` dispatcher that writes to stderr and, when configured,
//! to a log file. The dispatcher is returned to the caller instead of being
//! installed behind its back, so tests can run components under their own
//! subscriber with `tracing::dispatcher::with_default`.
//!
//! # Examples
//!
//! ```no_run
//! use libpostpull::logging::{LogFormat, LoggingConfig};
//!
//! let logging = LoggingConfig::new(LogFormat::Json, "info".to_string(), false)
//!     .with_log_file("logs/post-pull.log")
//!     .build()
//!     .expect("log file is writable");
//! logging.install().expect("no subscriber installed yet");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

/// A built logging pipeline
///
/// Keep this value alive for the lifetime of the process: dropping it
/// flushes and stops the background file writer.
pub struct Logging {
    dispatch: Dispatch,
    _file_guard: Option<WorkerGuard>,
}

impl Logging {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Make this pipeline the process-wide default
    pub fn install(&self) -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    ///
    /// # Arguments
    ///
    /// * `format` - Log output format (text, json, or pretty)
    /// * `level` - Minimum log level (error, warn, info, debug, trace)
    /// * `verbose` - If true, defaults to debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
            log_file: None,
        }
    }

    /// Also write events to the given file, creating parent directories
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Build the subscriber without installing it
    pub fn build(&self) -> std::io::Result<Logging> {
        let mut layers: Vec<BoxedLayer> = vec![self.stderr_layer()];

        let file_guard = match &self.log_file {
            Some(path) => {
                let (layer, guard) = self.file_layer(path)?;
                layers.push(layer);
                Some(guard)
            }
            None => None,
        };

        let subscriber = tracing_subscriber::registry().with(layers);

        Ok(Logging {
            dispatch: Dispatch::new(subscriber),
            _file_guard: file_guard,
        })
    }

    /// `verbose` forces debug; otherwise `RUST_LOG` wins over `level`
    fn filter(&self) -> EnvFilter {
        if self.verbose {
            return EnvFilter::new("debug");
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    fn stderr_layer(&self) -> BoxedLayer {
        let filter = self.filter();
        match self.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Text => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .with_filter(filter)
                .boxed(),
        }
    }

    fn file_layer(&self, path: &Path) -> std::io::Result<(BoxedLayer, WorkerGuard)> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let file_name = path.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("log path has no file name: {}", path.display()),
            )
        })?;

        let appender = tracing_appender::rolling::never(&directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let filter = self.filter();
        let layer = match self.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .flatten_event(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Text | LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter)
                .boxed(),
        };

        Ok((layer, guard))
    }
}

/// Build logging from the `POSTPULL_LOG_FORMAT` and `POSTPULL_LOG_LEVEL`
/// environment variables, falling back to text at info level
pub fn config_from_env(verbose: bool) -> LoggingConfig {
    let format = std::env::var("POSTPULL_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("POSTPULL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    LoggingConfig::new(format, level, verbose)
}
