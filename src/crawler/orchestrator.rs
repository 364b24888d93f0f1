//! Crawl orchestrator - batch acceptance and per-job processing
//!
//! Accepting a batch moves every queued job in it to `Running` in one store
//! call, then spawns one task per job id. Each task independently:
//! 1. Takes the job's lease (skips if another task owns the job)
//! 2. Waits for a concurrency permit
//! 3. Loads the job (skips silently if it no longer exists)
//! 4. Marks it running
//! 5. Fetches the page; a fetch failure ends the job in `Error`
//! 6. Analyzes the page and samples its links, then ends the job in `Completed`
//!
//! Tasks never wait on each other, are never retried and are never cancelled.

use crate::config::Config;
use crate::crawler::analyzer::analyze_page;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::verifier::LinkVerifier;
use crate::state::{JobLeases, JobStatus};
use crate::storage::{CrawlJob, JobStore, JobUpdate, StorageError};
use crate::url::validate_job_url;
use crate::SurveyError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Why a task left its job untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The job id is not in the store
    NotFound,
    /// Another task is processing the same job
    AlreadyOwned,
    /// The job had already reached a terminal status
    AlreadyFinished,
    /// The job was deleted before its outcome could be written
    Deleted,
}

/// How one dispatched task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The page was analyzed and the job is `Completed`
    Completed,
    /// The fetch failed and the job is `Error`
    Failed { error: String },
    /// The task did not process the job
    Skipped(SkipReason),
    /// The job store rejected a read or write
    StoreFailed { error: String },
    /// The task panicked
    Aborted { error: String },
}

/// Handle to the tasks spawned for one accepted batch
///
/// Dropping the handle detaches the tasks; they still run to completion.
#[derive(Debug)]
pub struct BatchHandle {
    transitioned: usize,
    tasks: Vec<(String, JoinHandle<JobOutcome>)>,
}

impl BatchHandle {
    /// Number of jobs moved from `Queued` to `Running` by the batch step
    pub fn transitioned(&self) -> usize {
        self.transitioned
    }

    /// Number of tasks spawned
    pub fn dispatched(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every task in the batch
    pub async fn join(self) -> BatchReport {
        let mut outcomes = Vec::with_capacity(self.tasks.len());

        for (id, handle) in self.tasks {
            let outcome = handle.await.unwrap_or_else(|e| JobOutcome::Aborted {
                error: e.to_string(),
            });
            outcomes.push((id, outcome));
        }

        BatchReport {
            transitioned: self.transitioned,
            outcomes,
        }
    }
}

/// Outcomes of a finished batch, in batch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub transitioned: usize,
    pub outcomes: Vec<(String, JobOutcome)>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Completed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Skipped(_)))
    }

    /// Outcome for one job id (the first, if the batch named it twice)
    pub fn outcome(&self, id: &str) -> Option<&JobOutcome> {
        self.outcomes
            .iter()
            .find(|(job_id, _)| job_id == id)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, predicate: impl Fn(&JobOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Drives crawl jobs from `Queued` to a terminal status
///
/// Cheap to clone; clones share the store, HTTP clients, concurrency permits
/// and job leases.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    fetcher: Fetcher,
    verifier: LinkVerifier,
    permits: Arc<Semaphore>,
    leases: JobLeases,
}

impl Orchestrator {
    /// Creates an orchestrator from configuration
    pub fn new(config: &Config, store: Arc<dyn JobStore>) -> Result<Self, SurveyError> {
        let fetcher = Fetcher::new(&config.fetcher, &config.user_agent)?;
        let verifier = LinkVerifier::new(&config.verifier, &config.user_agent)?;

        Ok(Self::with_components(
            store,
            fetcher,
            verifier,
            config.orchestrator.max_concurrent_jobs,
        ))
    }

    /// Creates an orchestrator from prebuilt parts
    pub fn with_components(
        store: Arc<dyn JobStore>,
        fetcher: Fetcher,
        verifier: LinkVerifier,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            verifier,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            leases: JobLeases::new(),
        }
    }

    /// The job store this orchestrator writes to
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validates a URL and stores a new queued job for it
    pub fn submit(&self, url: &str) -> Result<CrawlJob, SurveyError> {
        let job = CrawlJob::new(validate_job_url(url)?);
        self.store.create(&job)?;
        tracing::info!("Queued job {} for {}", job.id, job.url);
        Ok(job)
    }

    /// Accepts a batch of job ids and dispatches one task per id
    ///
    /// Every `Queued` job among `ids` becomes `Running` before any task is
    /// spawned; jobs in other statuses are not touched by this step. A task is
    /// spawned for every id in the batch, including ids that were not
    /// transitioned; such tasks skip jobs that are missing or already finished.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn accept_batch(&self, ids: &[String]) -> Result<BatchHandle, SurveyError> {
        let transitioned = self.store.mark_running(ids)?;
        tracing::info!(
            "Accepted batch of {} jobs ({} moved to running)",
            ids.len(),
            transitioned
        );

        let tasks = ids
            .iter()
            .map(|id| {
                let orchestrator = self.clone();
                let job_id = id.clone();
                let handle = tokio::spawn(async move { orchestrator.process_job(&job_id).await });
                (id.clone(), handle)
            })
            .collect();

        Ok(BatchHandle {
            transitioned,
            tasks,
        })
    }

    /// Runs the full pipeline for one job
    pub async fn process_job(&self, id: &str) -> JobOutcome {
        let Some(lease) = self.leases.try_acquire(id) else {
            tracing::debug!("Job {} is already being processed, skipping", id);
            return JobOutcome::Skipped(SkipReason::AlreadyOwned);
        };
        tracing::debug!("Took lease for job {}", lease.job_id());

        // The semaphore is never closed, so acquisition only waits
        let Ok(_permit) = self.permits.acquire().await else {
            return JobOutcome::Aborted {
                error: "concurrency limiter closed".to_string(),
            };
        };

        let job = match self.store.get(id) {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Job {} not found, skipping", id);
                return JobOutcome::Skipped(SkipReason::NotFound);
            }
            Err(e) => return store_failure(id, e),
        };

        if job.status.is_terminal() {
            tracing::info!("Job {} already {}, skipping", id, job.status);
            return JobOutcome::Skipped(SkipReason::AlreadyFinished);
        }

        match self
            .store
            .update_status(id, JobStatus::Running, &JobUpdate::default())
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::info!("Job {} was deleted before it started, skipping", id);
                return JobOutcome::Skipped(SkipReason::Deleted);
            }
            Err(e) => return store_failure(id, e),
        }

        tracing::info!("Crawling {} (job {})", job.url, id);

        let (status, update, outcome) = match self.fetcher.fetch(&job.url).await {
            Ok(page) => {
                let analysis = analyze_page(&page.body, &job.url);
                let broken_links = self.verifier.verify(&page.body, &job.url).await;

                tracing::info!(
                    "Job {} completed: {} internal, {} external, {} broken",
                    id,
                    analysis.internal_links,
                    analysis.external_links,
                    broken_links.len()
                );

                (
                    JobStatus::Completed,
                    JobUpdate::completed(analysis, broken_links),
                    JobOutcome::Completed,
                )
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Job {} failed: {}", id, error);

                (
                    JobStatus::Error,
                    JobUpdate::failed(error.clone()),
                    JobOutcome::Failed { error },
                )
            }
        };

        match self.store.update_status(id, status, &update) {
            Ok(_) => outcome,
            Err(e) if e.is_not_found() => {
                tracing::info!("Job {} was deleted while running, dropping result", id);
                JobOutcome::Skipped(SkipReason::Deleted)
            }
            Err(e) => store_failure(id, e),
        }
    }
}

fn store_failure(id: &str, error: StorageError) -> JobOutcome {
    tracing::error!("Job store error for job {}: {}", id, error);
    JobOutcome::StoreFailed {
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JobPage, ListQuery, SqliteJobStore, StorageResult};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator() -> Orchestrator {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        Orchestrator::new(&Config::default(), store).unwrap()
    }

    async fn page_server(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_submit_rejects_invalid_url() {
        let orchestrator = orchestrator();
        assert!(matches!(
            orchestrator.submit("ftp://example.com"),
            Err(SurveyError::Url(_))
        ));
        assert_eq!(orchestrator.store().count_total().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_job_is_skipped() {
        let orchestrator = orchestrator();

        let report = orchestrator
            .accept_batch(&["no-such-job".to_string()])
            .await
            .unwrap()
            .join()
            .await;

        assert_eq!(report.transitioned, 0);
        assert_eq!(
            report.outcome("no-such-job"),
            Some(&JobOutcome::Skipped(SkipReason::NotFound))
        );
    }

    #[tokio::test]
    async fn test_finished_job_is_not_reprocessed() {
        let server = page_server("<title>First</title>").await;
        let orchestrator = orchestrator();
        let job = orchestrator.submit(&server.uri()).unwrap();
        let ids = vec![job.id.clone()];

        orchestrator.accept_batch(&ids).await.unwrap().join().await;
        let first = orchestrator.store().get(&job.id).unwrap();
        assert_eq!(first.status, JobStatus::Completed);

        let report = orchestrator.accept_batch(&ids).await.unwrap().join().await;
        let second = orchestrator.store().get(&job.id).unwrap();

        assert_eq!(
            report.outcome(&job.id),
            Some(&JobOutcome::Skipped(SkipReason::AlreadyFinished))
        );
        assert_eq!(second.completed_at, first.completed_at);
    }

    #[tokio::test]
    async fn test_duplicate_id_in_batch_runs_once() {
        let server = page_server("<title>Once</title>").await;
        let orchestrator = orchestrator();
        let job = orchestrator.submit(&server.uri()).unwrap();

        let handle = orchestrator
            .accept_batch(&[job.id.clone(), job.id.clone()])
            .await
            .unwrap();
        assert_eq!(handle.transitioned(), 1);
        assert_eq!(handle.dispatched(), 2);

        let report = handle.join().await;
        assert_eq!(report.completed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn test_running_job_is_processed_without_batch_transition() {
        let server = page_server("<title>Stale</title>").await;
        let orchestrator = orchestrator();
        let job = orchestrator.submit(&server.uri()).unwrap();
        orchestrator.store().mark_running(&[job.id.clone()]).unwrap();

        let handle = orchestrator.accept_batch(&[job.id.clone()]).await.unwrap();
        assert_eq!(handle.transitioned(), 0);

        let report = handle.join().await;
        assert_eq!(report.completed(), 1);
        assert_eq!(
            orchestrator.store().get(&job.id).unwrap().title,
            "Stale"
        );
    }

    #[tokio::test]
    async fn test_deleted_job_is_not_resurrected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Slow</title>")
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let orchestrator = orchestrator();
        let job = orchestrator.submit(&server.uri()).unwrap();

        let handle = orchestrator.accept_batch(&[job.id.clone()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(orchestrator.store().delete(&job.id).unwrap());

        let report = handle.join().await;
        assert_eq!(
            report.outcome(&job.id),
            Some(&JobOutcome::Skipped(SkipReason::Deleted))
        );
        assert!(orchestrator.store().get(&job.id).unwrap_err().is_not_found());
    }

    /// Store that deletes a job at the moment it is marked running
    struct DeleteOnStart {
        inner: SqliteJobStore,
    }

    impl JobStore for DeleteOnStart {
        fn create(&self, job: &CrawlJob) -> StorageResult<()> {
            self.inner.create(job)
        }

        fn get(&self, id: &str) -> StorageResult<CrawlJob> {
            self.inner.get(id)
        }

        fn update_status(
            &self,
            id: &str,
            status: JobStatus,
            fields: &JobUpdate,
        ) -> StorageResult<CrawlJob> {
            if status == JobStatus::Running {
                self.inner.delete(id)?;
            }
            self.inner.update_status(id, status, fields)
        }

        fn mark_running(&self, ids: &[String]) -> StorageResult<usize> {
            self.inner.mark_running(ids)
        }

        fn requeue(&self, id: &str) -> StorageResult<CrawlJob> {
            self.inner.requeue(id)
        }

        fn list_paginated(&self, query: &ListQuery) -> StorageResult<JobPage> {
            self.inner.list_paginated(query)
        }

        fn delete(&self, id: &str) -> StorageResult<bool> {
            self.inner.delete(id)
        }

        fn bulk_delete(&self, ids: &[String]) -> StorageResult<usize> {
            self.inner.bulk_delete(ids)
        }

        fn count_by_status(&self, status: JobStatus) -> StorageResult<u64> {
            self.inner.count_by_status(status)
        }

        fn count_total(&self) -> StorageResult<u64> {
            self.inner.count_total()
        }
    }

    #[tokio::test]
    async fn test_job_deleted_before_start_is_skipped() {
        let store: Arc<dyn JobStore> = Arc::new(DeleteOnStart {
            inner: SqliteJobStore::open_in_memory().unwrap(),
        });
        let orchestrator = Orchestrator::new(&Config::default(), store).unwrap();
        let job = CrawlJob::new("http://127.0.0.1:1/");
        orchestrator.store().create(&job).unwrap();

        let outcome = orchestrator.process_job(&job.id).await;

        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::Deleted));
        assert!(orchestrator.store().get(&job.id).unwrap_err().is_not_found());
    }
}
