//! Error types for post-pull

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostPullError>;

#[derive(Error, Debug)]
pub enum PostPullError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Process setup (log sinks, signal handlers) failed
    #[error("Startup failed: {0}")]
    Startup(String),
}

impl PostPullError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostPullError::Config(_) => 2,
            PostPullError::Storage(_) => 1,
            PostPullError::Fetch(_) => 1,
            PostPullError::InvalidInput(_) => 1,
            PostPullError::Startup(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document store operation failed: {0}")]
    Document(#[from] mongodb::error::Error),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Rate limit exceeded (resets at {})", display_reset(.reset_at))]
    RateLimit { reset_at: Option<DateTime<Utc>> },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether the remote side asked us to back off
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimit { .. })
    }
}

fn display_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => at.to_rfc3339(),
        None => "unknown".to_string(),
    }
}
