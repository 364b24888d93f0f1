//! HTML analyzer for extracting structural page metadata
//!
//! This module extracts from raw page markup:
//! - The page title
//! - The declared HTML version
//! - Heading counts per level
//! - Internal and external link counts
//! - Whether the page carries a login form
//!
//! Extraction is lightweight pattern matching over the raw text, not a DOM
//! parse. Every extraction tolerates absence: no match yields the default
//! value, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("title pattern is valid")
});

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h([1-6])\b[^>]*>").expect("heading pattern is valid"));

static ANCHOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("anchor pattern is valid")
});

/// Substrings that mark a login form, checked case-insensitively in order
const LOGIN_PATTERNS: &[&str] = &[
    r#"type="password""#,
    r#"name="password""#,
    r#"id="password""#,
    r#"name="login""#,
    r#"id="login""#,
    r#"class="login""#,
];

/// Count of opening heading tags per level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingCounts {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

impl HeadingCounts {
    /// Returns the count for a heading level (1-6); other levels are 0
    pub fn get(&self, level: u8) -> u32 {
        match level {
            1 => self.h1,
            2 => self.h2,
            3 => self.h3,
            4 => self.h4,
            5 => self.h5,
            6 => self.h6,
            _ => 0,
        }
    }

    fn increment(&mut self, level: u8) {
        match level {
            1 => self.h1 += 1,
            2 => self.h2 += 1,
            3 => self.h3 += 1,
            4 => self.h4 += 1,
            5 => self.h5 += 1,
            6 => self.h6 += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        (1..=6).map(|level| self.get(level)).sum()
    }
}

/// HTML version classified from the raw markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlVersion {
    Html5,
    Html401,
    Xhtml,
    Unknown,
}

impl HtmlVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html5 => "HTML5",
            Self::Html401 => "HTML 4.01",
            Self::Xhtml => "XHTML",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for HtmlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an anchor target relates to the page it appears on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Root-relative, or contains the page URL
    Internal,
    /// Starts with `http` and does not contain the page URL
    External,
    /// Neither (mailto:, bare fragments, relative paths without a leading slash)
    Other,
}

/// Structural metadata extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub title: String,
    pub html_version: String,
    pub heading_counts: HeadingCounts,
    pub internal_links: u32,
    pub external_links: u32,
    pub has_login_form: bool,
}

/// Runs every extraction over a fetched page
///
/// # Arguments
///
/// * `html` - Raw page text
/// * `page_url` - The job URL the page was fetched from, used for link classification
///
/// # Example
///
/// ```
/// use sumi_survey::crawler::analyze_page;
///
/// let html = r#"<!DOCTYPE html><title>Home</title><h1>Hi</h1><a href="/about">About</a>"#;
/// let analysis = analyze_page(html, "https://example.com");
/// assert_eq!(analysis.title, "Home");
/// assert_eq!(analysis.html_version, "HTML5");
/// assert_eq!(analysis.internal_links, 1);
/// ```
pub fn analyze_page(html: &str, page_url: &str) -> PageAnalysis {
    let (internal_links, external_links) = count_links(html, page_url);

    PageAnalysis {
        title: extract_title(html),
        html_version: detect_html_version(html).as_str().to_string(),
        heading_counts: count_headings(html),
        internal_links,
        external_links,
        has_login_form: has_login_form(html),
    }
}

/// Extracts the first `<title>` element's text, trimmed
///
/// Returns an empty string when the page has no title.
pub fn extract_title(html: &str) -> String {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Classifies the HTML version; the first matching rule wins
///
/// Rules, checked case-insensitively in order:
/// `<!doctype html>` => HTML5, `html 4.01` => HTML 4.01, `xhtml` => XHTML.
pub fn detect_html_version(html: &str) -> HtmlVersion {
    let lower = html.to_lowercase();

    if lower.contains("<!doctype html>") {
        HtmlVersion::Html5
    } else if lower.contains("html 4.01") {
        HtmlVersion::Html401
    } else if lower.contains("xhtml") {
        HtmlVersion::Xhtml
    } else {
        HtmlVersion::Unknown
    }
}

/// Counts opening heading tags per level, ignoring attributes
pub fn count_headings(html: &str) -> HeadingCounts {
    let mut counts = HeadingCounts::default();

    for caps in HEADING_RE.captures_iter(html) {
        if let Some(level) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) {
            counts.increment(level);
        }
    }

    counts
}

/// Returns the href of every anchor element, in document order
pub fn extract_hrefs(html: &str) -> Vec<&str> {
    ANCHOR_HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .collect()
}

/// Classifies one href relative to the page URL
///
/// The rules compare raw strings: an href is external when it starts with
/// `http` and does not contain `page_url`; it is internal when it starts with
/// `/` or contains `page_url`. Anything else is counted as neither.
pub fn classify_href(href: &str, page_url: &str) -> LinkKind {
    if href.starts_with("http") && !href.contains(page_url) {
        LinkKind::External
    } else if href.starts_with('/') || href.contains(page_url) {
        LinkKind::Internal
    } else {
        LinkKind::Other
    }
}

/// Counts internal and external anchors
///
/// # Returns
///
/// `(internal, external)`
pub fn count_links(html: &str, page_url: &str) -> (u32, u32) {
    extract_hrefs(html)
        .into_iter()
        .fold((0, 0), |(internal, external), href| {
            match classify_href(href, page_url) {
                LinkKind::Internal => (internal + 1, external),
                LinkKind::External => (internal, external + 1),
                LinkKind::Other => (internal, external),
            }
        })
}

/// Returns true if the markup contains any login-form marker
pub fn has_login_form(html: &str) -> bool {
    let lower = html.to_lowercase();
    LOGIN_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}
