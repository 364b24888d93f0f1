use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Survey
///
/// Every section is optional; a missing section takes its documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub verifier: VerifierConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
}

/// Page fetch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Whole-request timeout for page fetches (seconds, default 30)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout (seconds, default 10)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Maximum redirects followed before the fetch fails (default 10)
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl FetcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 10,
        }
    }
}

/// Broken-link sampling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Timeout for each HEAD probe (seconds, default 10)
    #[serde(rename = "probe-timeout-secs")]
    pub probe_timeout_secs: u64,

    /// Number of external-looking hrefs probed per page (default 5)
    #[serde(rename = "max-probes")]
    pub max_probes: usize,

    /// Redirects a probe may follow before it fails (default 10)
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl VerifierConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            max_probes: 5,
            max_redirects: 10,
        }
    }
}

/// Job dispatch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of jobs processed at the same time (default 32)
    #[serde(rename = "max-concurrent-jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 32,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiSurvey".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./sumi-survey.db".to_string(),
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the markdown report file
    #[serde(rename = "report-path")]
    pub report_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: "./survey-report.md".to_string(),
        }
    }
}
