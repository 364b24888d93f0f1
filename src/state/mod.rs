//! State module for tracking crawl job progress
//!
//! - `JobStatus`: lifecycle of a crawl job (queued, running, completed, error)
//! - `JobLeases`: in-process ownership of jobs by processing tasks

mod job_status;
mod lease;

// Re-export main types
pub use job_status::JobStatus;
pub use lease::{JobLease, JobLeases};
