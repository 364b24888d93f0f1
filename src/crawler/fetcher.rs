//! HTTP fetcher implementation
//!
//! This module retrieves page content for crawl jobs:
//! - Building the HTTP client with the configured user agent and timeouts
//! - GET requests for page bodies
//! - Normalizing every transport failure into `FetchError`
//!
//! Any response with a readable body is accepted, including non-2xx status
//! codes. There is no retry.

use crate::config::{FetcherConfig, UserAgentConfig};
use reqwest::{redirect::Policy, Client};
use thiserror::Error;

/// Transport-level failure reaching a job's URL
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connection, TLS, redirect or timeout failure
    #[error("failed to fetch URL: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    /// The response arrived but its body could not be read
    #[error("failed to read response body: {source}")]
    Body {
        url: String,
        source: reqwest::Error,
    },
}

impl FetchError {
    /// The URL whose fetch failed
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. } | Self::Body { url, .. } => url,
        }
    }

    /// Returns true if the failure was a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport { source, .. } | Self::Body { source, .. } => source.is_timeout(),
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code (not necessarily 2xx)
    pub status_code: u16,
    /// Page body content
    pub body: String,
}

/// Builds the page-fetch HTTP client
///
/// # Example
///
/// ```no_run
/// use sumi_survey::config::{FetcherConfig, UserAgentConfig};
/// use sumi_survey::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default(), &UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    config: &FetcherConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Page fetcher bound to one HTTP client
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher with a client built from configuration
    pub fn new(config: &FetcherConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, user_agent)?,
        })
    }

    /// Fetches a URL and returns its body
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        fetch_url(&self.client, url).await
    }
}

/// Fetches a URL with a single GET request
///
/// # Returns
///
/// * `Ok(FetchedPage)` - A response with a readable body, whatever its status
/// * `Err(FetchError)` - The request or the body read failed
pub async fn fetch_url(client: &Client, url: &str) -> Result<FetchedPage, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        tracing::debug!("{} answered {}, analyzing body anyway", url, status);
    }

    let body = response.text().await.map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })?;

    Ok(FetchedPage {
        final_url,
        status_code: status.as_u16(),
        body,
    })
}
