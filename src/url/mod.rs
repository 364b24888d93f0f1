//! URL handling module for Sumi-Survey
//!
//! Submitted job URLs are validated but stored as typed (trimmed only). Link
//! classification compares hrefs against the stored URL as a raw substring,
//! so rewriting it here would change which links count as internal.

use crate::{UrlError, UrlResult};
use ::url::Url;

/// Validates a submitted job URL
///
/// Accepts absolute `http`/`https` URLs with a host.
///
/// # Returns
///
/// * `Ok(String)` - The trimmed URL, ready to store
/// * `Err(UrlError)` - The input is not an acceptable job URL
///
/// # Examples
///
/// ```
/// use sumi_survey::url::validate_job_url;
///
/// assert_eq!(validate_job_url("  https://example.com/ ").unwrap(), "https://example.com/");
/// assert!(validate_job_url("ftp://example.com").is_err());
/// ```
pub fn validate_job_url(input: &str) -> UrlResult<String> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|e| UrlError::Parse(format!("{}: {}", trimmed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(UrlError::MissingHost),
    }
}
