//! Statistics generation from the job store
//!
//! This module provides functionality for extracting and displaying
//! job counts from the storage layer.

use crate::state::JobStatus;
use crate::storage::{JobStore, StorageResult};
use std::collections::HashMap;

/// Job statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatistics {
    /// Total number of jobs in the store
    pub total_jobs: u64,

    /// Count of jobs by status (statuses with no jobs are omitted)
    pub jobs_by_status: HashMap<JobStatus, u64>,
}

impl JobStatistics {
    /// Count for one status
    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Completed share of finished jobs, in percent
    pub fn success_rate(&self) -> f64 {
        let completed = self.count(JobStatus::Completed);
        let finished = completed + self.count(JobStatus::Error);
        if finished == 0 {
            0.0
        } else {
            completed as f64 / finished as f64 * 100.0
        }
    }
}

/// Loads statistics from the job store
pub fn load_statistics(store: &dyn JobStore) -> StorageResult<JobStatistics> {
    let total_jobs = store.count_total()?;

    let mut jobs_by_status = HashMap::new();
    for status in JobStatus::all() {
        let count = store.count_by_status(status)?;
        if count > 0 {
            jobs_by_status.insert(status, count);
        }
    }

    Ok(JobStatistics {
        total_jobs,
        jobs_by_status,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &JobStatistics) {
    println!("=== Job Statistics ===\n");

    println!("Total jobs: {}", stats.total_jobs);
    println!();

    println!("Jobs by Status:");
    for status in JobStatus::all() {
        let count = stats.count(status);
        let percentage = if stats.total_jobs > 0 {
            (count as f64 / stats.total_jobs as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Success rate: {:.1}%", stats.success_rate());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CrawlJob, JobUpdate, SqliteJobStore};

    #[test]
    fn test_load_statistics() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let a = CrawlJob::new("http://a.example");
        let b = CrawlJob::new("http://b.example");
        let c = CrawlJob::new("http://c.example");
        for job in [&a, &b, &c] {
            store.create(job).unwrap();
        }
        store.mark_running(&[b.id.clone(), c.id.clone()]).unwrap();
        store
            .update_status(&c.id, JobStatus::Error, &JobUpdate::failed("down"))
            .unwrap();

        let stats = load_statistics(&store).unwrap();

        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.count(JobStatus::Queued), 1);
        assert_eq!(stats.count(JobStatus::Running), 1);
        assert_eq!(stats.count(JobStatus::Error), 1);
        assert_eq!(stats.count(JobStatus::Completed), 0);
        assert!(!stats.jobs_by_status.contains_key(&JobStatus::Completed));
    }

    #[test]
    fn test_success_rate() {
        let mut stats = JobStatistics::default();
        assert_eq!(stats.success_rate(), 0.0);

        stats.jobs_by_status.insert(JobStatus::Completed, 3);
        stats.jobs_by_status.insert(JobStatus::Error, 1);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
