//! Crawler module for crawl job processing
//!
//! This module contains the job processing pipeline, including:
//! - HTTP fetching of job pages
//! - HTML analysis of fetched content
//! - Bounded broken-link sampling
//! - Batch acceptance and concurrent per-job dispatch

mod analyzer;
mod fetcher;
mod orchestrator;
mod verifier;

pub use analyzer::{
    analyze_page, classify_href, count_headings, count_links, detect_html_version,
    extract_hrefs, extract_title, has_login_form, HeadingCounts, HtmlVersion, LinkKind,
    PageAnalysis,
};
pub use fetcher::{build_http_client, fetch_url, FetchError, FetchedPage, Fetcher};
pub use orchestrator::{BatchHandle, BatchReport, JobOutcome, Orchestrator, SkipReason};
pub use verifier::{
    build_probe_client, probe_link, sample_external_hrefs, BrokenLink, LinkVerifier, ProbeOutcome,
};
