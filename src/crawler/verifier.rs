//! Broken-link sampling
//!
//! Probes a bounded sample of a page's outbound links with HEAD requests.
//! Only hrefs starting with `http` are eligible, and only the first
//! `max_probes` of them (in document order) are probed. Probes run one after
//! another so the output order matches document order.

use crate::config::{UserAgentConfig, VerifierConfig};
use crate::crawler::analyzer::extract_hrefs;
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};

/// A sampled link whose probe failed or returned an error status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    /// The href as written in the page
    pub url: String,

    /// Response status (>= 400), or `None` when no response arrived
    pub status_code: Option<u16>,

    /// Human-readable failure description
    pub error: String,
}

/// Result of probing one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Responded below 400
    Alive { status_code: u16 },

    /// Responded with 400 or above
    HttpError { status_code: u16, reason: String },

    /// No response (DNS, connection, timeout)
    TransportError { error: String },
}

impl ProbeOutcome {
    /// Converts the outcome into a broken-link record, if it is one
    pub fn into_broken_link(self, url: &str) -> Option<BrokenLink> {
        match self {
            Self::Alive { .. } => None,
            Self::HttpError {
                status_code,
                reason,
            } => Some(BrokenLink {
                url: url.to_string(),
                status_code: Some(status_code),
                error: reason,
            }),
            Self::TransportError { error } => Some(BrokenLink {
                url: url.to_string(),
                status_code: None,
                error,
            }),
        }
    }
}

/// Builds the HEAD probe client
pub fn build_probe_client(
    config: &VerifierConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(config.probe_timeout())
        .redirect(Policy::limited(config.max_redirects))
        .build()
}

/// Selects the hrefs eligible for probing
///
/// Returns the first `max_probes` anchors whose href starts with `http`, in
/// document order.
pub fn sample_external_hrefs(html: &str, max_probes: usize) -> Vec<&str> {
    extract_hrefs(html)
        .into_iter()
        .filter(|href| href.starts_with("http"))
        .take(max_probes)
        .collect()
}

/// Sends one HEAD request and classifies the response
pub async fn probe_link(client: &Client, url: &str) -> ProbeOutcome {
    match client.head(url).send().await {
        Ok(response) => {
            let status = response.status();
            if status.as_u16() >= 400 {
                ProbeOutcome::HttpError {
                    status_code: status.as_u16(),
                    reason: format!("HTTP {}", status),
                }
            } else {
                ProbeOutcome::Alive {
                    status_code: status.as_u16(),
                }
            }
        }
        Err(e) => ProbeOutcome::TransportError {
            error: e.to_string(),
        },
    }
}

/// Link verifier bound to a probe client
#[derive(Debug, Clone)]
pub struct LinkVerifier {
    client: Client,
    max_probes: usize,
}

impl LinkVerifier {
    pub fn new(config: &VerifierConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_probe_client(config, user_agent)?,
            max_probes: config.max_probes,
        })
    }

    /// Probes the sampled links of a page and returns the broken ones
    ///
    /// # Arguments
    ///
    /// * `html` - Raw page text
    /// * `base_url` - URL of the page the links were found on
    ///
    /// # Returns
    ///
    /// Broken links in probe order; at most `max_probes` entries
    pub async fn verify(&self, html: &str, base_url: &str) -> Vec<BrokenLink> {
        let sample = sample_external_hrefs(html, self.max_probes);
        let mut broken = Vec::new();

        for href in &sample {
            let outcome = probe_link(&self.client, href).await;
            tracing::debug!("Probe {} from {}: {:?}", href, base_url, outcome);

            if let Some(link) = outcome.into_broken_link(href) {
                broken.push(link);
            }
        }

        tracing::debug!(
            "Verified {} links on {}, {} broken",
            sample.len(),
            base_url,
            broken.len()
        );

        broken
    }
}
