//! Storage module for persisting crawl jobs
//!
//! This module handles:
//! - The `CrawlJob` record and its partial-update type
//! - The `JobStore` contract the orchestrator consumes
//! - A SQLite-backed implementation of that contract
//!
//! Status transitions are checked here, so every store implementation keeps
//! the job invariants: `completed_at` is set exactly when the status is
//! terminal, and `error` is non-empty exactly when the status is `Error`.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::crawler::{BrokenLink, HeadingCounts, PageAnalysis};
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for listings
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page size accepted for listings
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Error text used when a failure is recorded without a cause
const UNKNOWN_ERROR: &str = "unknown error";

/// One URL's crawl request and its analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJob {
    pub id: String,
    pub url: String,
    pub title: String,
    pub html_version: String,
    pub heading_counts: HeadingCounts,
    pub internal_links: u32,
    pub external_links: u32,
    pub broken_links: Vec<BrokenLink>,
    pub has_login_form: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl CrawlJob {
    /// Creates a fresh queued job with a new UUID and empty analysis fields
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: String::new(),
            html_version: String::new(),
            heading_counts: HeadingCounts::default(),
            internal_links: 0,
            external_links: 0,
            broken_links: Vec::new(),
            has_login_form: false,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            error: String::new(),
        }
    }

    /// Moves the job to `status`, merging `fields`
    ///
    /// Rejects transitions that would move the status backwards. On a terminal
    /// status `completed_at` is stamped (unless supplied); on `Completed` the
    /// error is cleared, on `Error` it is guaranteed non-empty.
    pub fn apply_status_update(
        &mut self,
        status: JobStatus,
        fields: &JobUpdate,
    ) -> StorageResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: status,
            });
        }

        fields.apply_to(self);
        self.status = status;

        match status {
            JobStatus::Queued | JobStatus::Running => {
                self.completed_at = None;
                self.error.clear();
            }
            JobStatus::Completed => {
                self.completed_at.get_or_insert_with(Utc::now);
                self.error.clear();
            }
            JobStatus::Error => {
                self.completed_at.get_or_insert_with(Utc::now);
                if self.error.trim().is_empty() {
                    self.error = UNKNOWN_ERROR.to_string();
                }
            }
        }

        Ok(())
    }

    /// Resets a finished job so it can be triggered again
    ///
    /// Running jobs cannot be requeued; their owning task still has to write
    /// its terminal outcome.
    pub fn reset_for_requeue(&mut self) -> StorageResult<()> {
        if self.status == JobStatus::Running {
            return Err(StorageError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: JobStatus::Queued,
            });
        }

        self.title.clear();
        self.html_version.clear();
        self.heading_counts = HeadingCounts::default();
        self.internal_links = 0;
        self.external_links = 0;
        self.broken_links.clear();
        self.has_login_form = false;
        self.status = JobStatus::Queued;
        self.completed_at = None;
        self.error.clear();

        Ok(())
    }
}

/// Partial field merge for a job record
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub html_version: Option<String>,
    pub heading_counts: Option<HeadingCounts>,
    pub internal_links: Option<u32>,
    pub external_links: Option<u32>,
    pub broken_links: Option<Vec<BrokenLink>>,
    pub has_login_form: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Fields for a successfully analyzed page
    pub fn completed(analysis: PageAnalysis, broken_links: Vec<BrokenLink>) -> Self {
        Self {
            title: Some(analysis.title),
            html_version: Some(analysis.html_version),
            heading_counts: Some(analysis.heading_counts),
            internal_links: Some(analysis.internal_links),
            external_links: Some(analysis.external_links),
            broken_links: Some(broken_links),
            has_login_form: Some(analysis.has_login_form),
            completed_at: Some(Utc::now()),
            error: None,
        }
    }

    /// Fields for a failed fetch
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            completed_at: Some(Utc::now()),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn apply_to(&self, job: &mut CrawlJob) {
        if let Some(title) = &self.title {
            job.title = title.clone();
        }
        if let Some(version) = &self.html_version {
            job.html_version = version.clone();
        }
        if let Some(counts) = self.heading_counts {
            job.heading_counts = counts;
        }
        if let Some(internal) = self.internal_links {
            job.internal_links = internal;
        }
        if let Some(external) = self.external_links {
            job.external_links = external;
        }
        if let Some(broken) = &self.broken_links {
            job.broken_links = broken.clone();
        }
        if let Some(login) = self.has_login_form {
            job.has_login_form = login;
        }
        if let Some(completed_at) = self.completed_at {
            job.completed_at = Some(completed_at);
        }
        if let Some(error) = &self.error {
            job.error = error.clone();
        }
    }
}

/// Paginated listing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    /// Page size, 1..=100
    pub limit: u32,
    /// Only jobs with this status
    pub status: Option<JobStatus>,
}

impl ListQuery {
    /// Builds a query, clamping out-of-range input
    ///
    /// A page below 1 becomes 1; a limit outside 1..=100 becomes 10.
    pub fn new(page: i64, limit: i64, status: Option<JobStatus>) -> Self {
        let page = if page < 1 {
            1
        } else {
            u32::try_from(page).unwrap_or(u32::MAX)
        };
        let limit = if (1..=i64::from(MAX_PAGE_LIMIT)).contains(&limit) {
            limit as u32
        } else {
            DEFAULT_PAGE_LIMIT
        };

        Self {
            page,
            limit,
            status,
        }
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(1, i64::from(DEFAULT_PAGE_LIMIT), None)
    }
}

/// One page of jobs plus the total matching the filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPage {
    pub results: Vec<CrawlJob>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
