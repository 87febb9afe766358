//! Remote tracker status fetcher
//!
//! The cache engine talks to remote sites through the [`StatusSource`]
//! trait. [`RemoteFetcher`] is the production implementation: it GETs
//! `<siteurl>api.php?fn=trackerstatus` and decodes the JSON answer.

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use std::time::Duration;
use thiserror::Error;

use crate::models::{RemoteStatusResponse, TrackerStatus};

/// Message used when a remote reports `ok: false` without saying why
const UNSPECIFIED_REMOTE_ERROR: &str = "tracker status unavailable";

/// Errors that can occur while fetching a remote status
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Body was not a tracker status document
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The remote answered `ok: false`
    #[error("{0}")]
    Remote(String),
}

/// Source of fresh tracker status for a site
///
/// Implementations must be safe to call from many tasks; the cache engine
/// guarantees at most one outstanding call per site.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status of the site at canonical URL `site_url`
    async fn fetch_status(&self, site_url: &str) -> Result<TrackerStatus, FetchError>;
}

/// HTTP fetcher for site status endpoints
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: Client,
}

impl RemoteFetcher {
    /// Create a new fetcher with the given request timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("trackrelay/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Status endpoint for a canonical site URL (always ends with `/`)
    pub fn status_url(site_url: &str) -> String {
        format!("{site_url}api.php?fn=trackerstatus")
    }

    /// Decode a status endpoint body
    pub fn parse_body(body: &str) -> Result<TrackerStatus, FetchError> {
        let response: RemoteStatusResponse =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        if response.ok {
            Ok(TrackerStatus::new(
                response.tracker_status,
                response.tracker_status_at,
            ))
        } else {
            let message = response
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| UNSPECIFIED_REMOTE_ERROR.to_string());
            Err(FetchError::Remote(message))
        }
    }
}

#[async_trait]
impl StatusSource for RemoteFetcher {
    async fn fetch_status(&self, site_url: &str) -> Result<TrackerStatus, FetchError> {
        let url = Self::status_url(site_url);
        tracing::debug!(url = %url, "Fetching tracker status");

        // Error statuses still carry a JSON body describing the problem
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let http_status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        tracing::info!(url = %url, status = %http_status, body = %body, "Tracker status fetched");

        Self::parse_body(&body)
    }
}

/// The client timeout covers both sending and reading the body
fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(err)
    }
}
