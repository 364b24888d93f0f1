//! Output module for job listings, statistics and reports
//!
//! This module handles:
//! - Printing job listings and single jobs for the CLI
//! - Loading and printing job statistics
//! - Exporting a markdown report of every job in the store

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{load_statistics, print_statistics, JobStatistics};

use crate::storage::{CrawlJob, JobPage, JobStore, ListQuery, StorageError, MAX_PAGE_LIMIT};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Loads every job in the store, newest first
///
/// Walks the paginated listing with the largest page size.
pub fn load_all_jobs(store: &dyn JobStore) -> OutputResult<Vec<CrawlJob>> {
    let mut jobs = Vec::new();
    let mut page = 1;

    loop {
        let query = ListQuery::new(page, i64::from(MAX_PAGE_LIMIT), None);
        let batch = store.list_paginated(&query)?;
        let fetched = batch.results.len();
        jobs.extend(batch.results);

        if fetched < MAX_PAGE_LIMIT as usize || jobs.len() as u64 >= batch.total {
            break;
        }
        page += 1;
    }

    Ok(jobs)
}

/// Writes the markdown report for the whole store to `output_path`
///
/// Returns the number of jobs in the report.
pub fn export_report(store: &dyn JobStore, output_path: &Path) -> OutputResult<usize> {
    let stats = load_statistics(store)?;
    let jobs = load_all_jobs(store)?;

    tracing::info!(
        "Writing report for {} jobs to {}",
        jobs.len(),
        output_path.display()
    );
    generate_markdown_report(&stats, &jobs, output_path)?;

    Ok(jobs.len())
}

/// Renders one job as pretty-printed JSON
pub fn format_job_json(job: &CrawlJob) -> OutputResult<String> {
    Ok(serde_json::to_string_pretty(job)?)
}

/// Prints one page of a job listing as a table
pub fn print_job_page(page: &JobPage) {
    let pages = if page.total == 0 {
        1
    } else {
        page.total.div_ceil(u64::from(page.limit))
    };
    println!(
        "Page {} of {} ({} jobs total)\n",
        page.page, pages, page.total
    );

    if page.results.is_empty() {
        println!("No jobs.");
        return;
    }

    println!("{:<36}  {:<9}  {:<25}  URL", "ID", "STATUS", "CREATED");
    for job in &page.results {
        println!(
            "{:<36}  {:<9}  {:<25}  {}",
            job.id,
            job.status,
            job.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            job.url
        );
    }
}
