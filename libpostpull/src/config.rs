//! Configuration management for post-pull

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const DEFAULT_MAX_RESULTS: u32 = 100;
pub const DEFAULT_ROSTER_FILE: &str = "x_users.json";
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com/2";
pub const DEFAULT_BEARER_TOKEN_ENV: &str = "TWITTER_BEARER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output_folder_path: String,
    pub execution_interval_ms: u64,
    #[serde(default)]
    pub log_file_path: Option<String>,
    #[serde(default)]
    pub use_mongodb: bool,
    #[serde(default)]
    pub mongodb_uri: Option<String>,
    #[serde(default)]
    pub mongodb_db_name: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_roster_file")]
    pub roster_file_path: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_bearer_token_env")]
    pub bearer_token_env: String,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn default_roster_file() -> String {
    DEFAULT_ROSTER_FILE.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_bearer_token_env() -> String {
    DEFAULT_BEARER_TOKEN_ENV.to_string()
}

/// Connection settings for the document-store backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoSettings {
    pub uri: String,
    pub db_name: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: Config = if is_toml {
            toml::from_str(&content).map_err(ConfigError::TomlError)?
        } else {
            serde_json::from_str(&content).map_err(ConfigError::ParseError)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.execution_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "execution_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.use_mongodb {
            self.mongo_settings()?;
        }

        Ok(())
    }

    /// Document-store settings, required when `use_mongodb` is set
    pub fn mongo_settings(&self) -> Result<MongoSettings> {
        let uri = non_empty(&self.mongodb_uri)
            .ok_or_else(|| ConfigError::MissingField("mongodb_uri".to_string()))?;
        let db_name = non_empty(&self.mongodb_db_name)
            .ok_or_else(|| ConfigError::MissingField("mongodb_db_name".to_string()))?;

        Ok(MongoSettings {
            uri: uri.to_string(),
            db_name: db_name.to_string(),
        })
    }

    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms)
    }

    pub fn output_folder(&self) -> PathBuf {
        expand_path(&self.output_folder_path)
    }

    pub fn roster_path(&self) -> PathBuf {
        expand_path(&self.roster_file_path)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty(&self.log_file_path).map(expand_path)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            output_folder_path: "output".to_string(),
            execution_interval_ms: 15 * 60 * 1000,
            log_file_path: Some("logs/post-pull.log".to_string()),
            use_mongodb: false,
            mongodb_uri: None,
            mongodb_db_name: None,
            max_results: DEFAULT_MAX_RESULTS,
            roster_file_path: default_roster_file(),
            api_base_url: default_api_base_url(),
            bearer_token_env: default_bearer_token_env(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path
///
/// `POSTPULL_CONFIG` wins, then `config.json` in the working directory,
/// then the user config directory.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("POSTPULL_CONFIG") {
        return expand_path(&path);
    }

    let local = PathBuf::from("config.json");
    if local.exists() {
        return local;
    }

    match dirs::config_dir() {
        Some(dir) => dir.join("post-pull").join("config.json"),
        None => local,
    }
}
