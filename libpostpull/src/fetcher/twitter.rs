//! X/Twitter v2 API client
//!
//! Implements [`PostSource`] over two endpoints:
//!
//! - `GET /users/by/username/:handle` to resolve a handle to its user id
//! - `GET /users/:id/tweets` for one page of the user's timeline
//!
//! Requests authenticate with an app-only bearer token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, FetchError, Result};
use crate::fetcher::{FetchResult, PostSource, TimelineRequest};
use crate::types::Post;

/// Header carrying the epoch second at which the rate-limit window resets
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: Option<UserData>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelinePage {
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl ApiProblem {
    fn describe(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "unknown problem".to_string())
    }
}

/// Client for the X/Twitter v2 API
pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: SecretString,
}

impl TwitterClient {
    /// Create a client against `base_url` (e.g. `https://api.twitter.com/2`)
    pub fn new(base_url: impl Into<String>, bearer_token: SecretString) -> FetchResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("post-pull/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    /// Create a client from configuration
    ///
    /// The bearer token is read from the environment variable named by
    /// `bearer_token_env`, after loading a `.env` file if one exists.
    pub fn from_config(config: &Config) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let token = std::env::var(&config.bearer_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField(config.bearer_token_env.clone()))?;

        Ok(Self::new(&config.api_base_url, SecretString::from(token))?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> FetchResult<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &headers, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PostSource for TwitterClient {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn resolve_user_id(&self, handle: &str) -> FetchResult<String> {
        let url = format!("{}/users/by/username/{}", self.base_url, handle);
        let lookup: UserLookup = self.get_json(&url, &[]).await?;

        match lookup.data {
            Some(user) => Ok(user.id),
            None => {
                let detail = lookup
                    .errors
                    .first()
                    .map(ApiProblem::describe)
                    .unwrap_or_else(|| handle.to_string());
                Err(FetchError::NotFound(detail))
            }
        }
    }

    async fn user_posts(&self, request: &TimelineRequest) -> FetchResult<Vec<Post>> {
        let url = format!("{}/users/{}/tweets", self.base_url, request.user_id);
        let page: TimelinePage = self.get_json(&url, &request.query_pairs()).await?;

        if let Some(meta) = &page.meta {
            debug!(user_id = %request.user_id, %meta, "Timeline page metadata");
        }

        Ok(page
            .data
            .unwrap_or_default()
            .into_iter()
            .map(Post)
            .collect())
    }
}

/// Map a non-success HTTP response to a [`FetchError`]
///
/// - 429 → `RateLimit`, reset time taken from `x-rate-limit-reset`
/// - 401/403 → `Authentication`
/// - 404 → `NotFound`
/// - anything else → `Http`
fn map_status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    } else {
        body.trim().to_string()
    };

    match status.as_u16() {
        429 => FetchError::RateLimit {
            reset_at: parse_reset_header(
                headers
                    .get(RATE_LIMIT_RESET_HEADER)
                    .and_then(|v| v.to_str().ok()),
            ),
        },
        401 | 403 => FetchError::Authentication(format!(
            "{}. Suggestion: check that the bearer token is valid and has API access",
            message
        )),
        404 => FetchError::NotFound(message),
        code => FetchError::Http {
            status: code,
            message,
        },
    }
}

/// Parse an epoch-seconds reset header
pub fn parse_reset_header(value: Option<&str>) -> Option<DateTime<Utc>> {
    value?
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}
