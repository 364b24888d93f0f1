//! Storage traits and error types
//!
//! This module defines the job store contract consumed by the orchestrator
//! and the interface layer, and the associated error types.

use crate::state::JobStatus;
use crate::storage::{CrawlJob, JobPage, JobUpdate, ListQuery};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Invalid status transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Returns true if the error means the job does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Record store for crawl jobs, keyed by job ID
///
/// Implementations are shared between concurrently running job tasks, so
/// every method takes `&self` and must be safe to call from many threads.
/// Each method is an independent point operation; no method holds a
/// transaction open across calls.
pub trait JobStore: Send + Sync {
    /// Inserts a new job
    ///
    /// The caller supplies a fresh unique id, status `Queued` and empty
    /// analysis fields (see `CrawlJob::new`).
    fn create(&self, job: &CrawlJob) -> StorageResult<()>;

    /// Gets a job by ID
    ///
    /// Returns `StorageError::JobNotFound` if no such job exists.
    fn get(&self, id: &str) -> StorageResult<CrawlJob>;

    /// Moves a job to `status`, merging the supplied fields
    ///
    /// Fails with `StorageError::InvalidTransition` if the move would regress
    /// the status. Returns the stored record after the update.
    fn update_status(&self, id: &str, status: JobStatus, fields: &JobUpdate)
        -> StorageResult<CrawlJob>;

    /// Moves every `Queued` job among `ids` to `Running` in one step
    ///
    /// Jobs in any other status, and unknown ids, are left untouched.
    ///
    /// # Returns
    ///
    /// The number of jobs transitioned
    fn mark_running(&self, ids: &[String]) -> StorageResult<usize>;

    /// Resets a finished or queued job to `Queued` with empty analysis fields
    fn requeue(&self, id: &str) -> StorageResult<CrawlJob>;

    /// Lists jobs newest first, optionally filtered by status
    fn list_paginated(&self, query: &ListQuery) -> StorageResult<JobPage>;

    /// Deletes a job; returns false if it did not exist
    fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Deletes every listed job; returns how many existed
    fn bulk_delete(&self, ids: &[String]) -> StorageResult<usize>;

    /// Counts jobs in one status
    fn count_by_status(&self, status: JobStatus) -> StorageResult<u64>;

    /// Counts all jobs
    fn count_total(&self) -> StorageResult<u64>;
}
