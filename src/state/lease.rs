//! Per-job leases
//!
//! A lease marks a job as owned by one in-flight processing task. Two
//! batches that name the same job id cannot process it at the same time:
//! the second task fails to take the lease and skips the job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of job ids currently owned by processing tasks
#[derive(Debug, Clone, Default)]
pub struct JobLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl JobLeases {
    /// Creates an empty lease set
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `job_id`
    ///
    /// Returns `None` if another task already holds it. The returned guard
    /// releases the lease when dropped.
    pub fn try_acquire(&self, job_id: &str) -> Option<JobLease> {
        if !self.lock().insert(job_id.to_string()) {
            return None;
        }

        Some(JobLease {
            job_id: job_id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    // The set holds plain strings, so a poisoned lock still has consistent data.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one job, released on drop
#[derive(Debug)]
pub struct JobLease {
    job_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl JobLease {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.job_id);
    }
}
