//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.
//! One connection is shared behind a mutex; every trait method takes the lock
//! for the duration of a single point operation.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::{CrawlJob, JobPage, JobUpdate, ListQuery};
use crate::SurveyError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Column list shared by every job SELECT, in `row_to_job` order
const JOB_COLUMNS: &str = "id, url, status, title, html_version, heading_counts, internal_links, \
     external_links, broken_links, has_login_form, created_at, completed_at, error";

/// Ids per statement for IN (...) batches, below SQLite's variable limit
const ID_CHUNK: usize = 500;

/// SQLite job store
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Opens (or creates) the job database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteJobStore)` - Successfully opened/created database
    /// * `Err(SurveyError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SurveyError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, SurveyError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, job: &CrawlJob) -> StorageResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO crawl_jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.url,
                job.status.to_db_string(),
                job.title,
                job.html_version,
                serde_json::to_string(&job.heading_counts)?,
                job.internal_links,
                job.external_links,
                serde_json::to_string(&job.broken_links)?,
                job.has_login_form,
                format_timestamp(&job.created_at),
                job.completed_at.as_ref().map(format_timestamp),
                job.error,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::DuplicateJob(job.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> StorageResult<CrawlJob> {
        let conn = self.conn()?;
        load_job(&conn, id)
    }

    fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        fields: &JobUpdate,
    ) -> StorageResult<CrawlJob> {
        let conn = self.conn()?;
        let mut job = load_job(&conn, id)?;
        job.apply_status_update(status, fields)?;
        save_job(&conn, &job)?;
        Ok(job)
    }

    fn mark_running(&self, ids: &[String]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        // All chunks commit together or not at all
        let tx = conn.transaction()?;
        let mut transitioned = 0;

        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "UPDATE crawl_jobs SET status = ? WHERE status = ? AND id IN ({})",
                placeholders(chunk.len())
            );
            let mut values = vec![
                JobStatus::Running.to_db_string(),
                JobStatus::Queued.to_db_string(),
            ];
            values.extend(chunk.iter().map(String::as_str));

            transitioned += tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(transitioned)
    }

    fn requeue(&self, id: &str) -> StorageResult<CrawlJob> {
        let conn = self.conn()?;
        let mut job = load_job(&conn, id)?;
        job.reset_for_requeue()?;
        save_job(&conn, &job)?;
        Ok(job)
    }

    fn list_paginated(&self, query: &ListQuery) -> StorageResult<JobPage> {
        let conn = self.conn()?;
        let limit = i64::from(query.limit);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let (total, results) = match query.status {
            Some(status) => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM crawl_jobs WHERE status = ?1",
                    params![status.to_db_string()],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM crawl_jobs WHERE status = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.to_db_string(), limit, offset], row_to_job)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
            None => {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM crawl_jobs", [], |row| row.get(0))?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM crawl_jobs
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![limit, offset], row_to_job)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
        };

        Ok(JobPage {
            results,
            total: total as u64,
            page: query.page,
            limit: query.limit,
        })
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM crawl_jobs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn bulk_delete(&self, ids: &[String]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;

        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "DELETE FROM crawl_jobs WHERE id IN ({})",
                placeholders(chunk.len())
            );
            deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn count_by_status(&self, status: JobStatus) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crawl_jobs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM crawl_jobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn load_job(conn: &Connection, id: &str) -> StorageResult<CrawlJob> {
    conn.query_row(
        &format!("SELECT {} FROM crawl_jobs WHERE id = ?1", JOB_COLUMNS),
        params![id],
        row_to_job,
    )
    .optional()?
    .ok_or_else(|| StorageError::JobNotFound(id.to_string()))
}

fn save_job(conn: &Connection, job: &CrawlJob) -> StorageResult<()> {
    conn.execute(
        "UPDATE crawl_jobs SET status = ?1, title = ?2, html_version = ?3, heading_counts = ?4,
         internal_links = ?5, external_links = ?6, broken_links = ?7, has_login_form = ?8,
         completed_at = ?9, error = ?10 WHERE id = ?11",
        params![
            job.status.to_db_string(),
            job.title,
            job.html_version,
            serde_json::to_string(&job.heading_counts)?,
            job.internal_links,
            job.external_links,
            serde_json::to_string(&job.broken_links)?,
            job.has_login_form,
            job.completed_at.as_ref().map(format_timestamp),
            job.error,
            job.id,
        ],
    )?;
    Ok(())
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    let status: String = row.get(2)?;
    let heading_counts: String = row.get(5)?;
    let broken_links: String = row.get(8)?;
    let created_at: String = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;

    Ok(CrawlJob {
        id: row.get(0)?,
        url: row.get(1)?,
        status: JobStatus::from_db_string(&status).ok_or_else(|| {
            conversion_error(2, format!("unknown job status '{}'", status).into())
        })?,
        title: row.get(3)?,
        html_version: row.get(4)?,
        heading_counts: serde_json::from_str(&heading_counts)
            .map_err(|e| conversion_error(5, Box::new(e)))?,
        internal_links: row.get(6)?,
        external_links: row.get(7)?,
        broken_links: serde_json::from_str(&broken_links)
            .map_err(|e| conversion_error(8, Box::new(e)))?,
        has_login_form: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
        completed_at: completed_at
            .map(|value| parse_timestamp(11, &value))
            .transpose()?,
        error: row.get(12)?,
    })
}

fn conversion_error(
    column: usize,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, source)
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, Box::new(e)))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{BrokenLink, HeadingCounts};
    use chrono::Duration;
    use tempfile::TempDir;

    fn store() -> SqliteJobStore {
        SqliteJobStore::open_in_memory().unwrap()
    }

    fn job_created_at(url: &str, minutes_ago: i64) -> CrawlJob {
        let mut job = CrawlJob::new(url);
        job.created_at = Utc::now() - Duration::minutes(minutes_ago);
        job
    }

    fn ids(jobs: &[&CrawlJob]) -> Vec<String> {
        jobs.iter().map(|j| j.id.clone()).collect()
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let job = CrawlJob::new("http://example.com");
        store.create(&job).unwrap();

        let loaded = store.get(&job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.url, "http://example.com");
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.heading_counts, HeadingCounts::default());
        assert!(loaded.broken_links.is_empty());
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let err = store().get("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_duplicate_id() {
        let store = store();
        let job = CrawlJob::new("http://example.com");
        store.create(&job).unwrap();

        assert!(matches!(
            store.create(&job),
            Err(StorageError::DuplicateJob(_))
        ));
    }

    #[test]
    fn test_update_status_persists_analysis() {
        let store = store();
        let job = CrawlJob::new("http://example.com");
        store.create(&job).unwrap();
        store
            .update_status(&job.id, JobStatus::Running, &JobUpdate::default())
            .unwrap();

        let update = JobUpdate {
            title: Some("Home".to_string()),
            heading_counts: Some(HeadingCounts {
                h1: 1,
                h2: 2,
                ..HeadingCounts::default()
            }),
            broken_links: Some(vec![BrokenLink {
                url: "http://dead.example".to_string(),
                status_code: None,
                error: "connection refused".to_string(),
            }]),
            has_login_form: Some(true),
            ..JobUpdate::default()
        };
        store
            .update_status(&job.id, JobStatus::Completed, &update)
            .unwrap();

        let loaded = store.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.title, "Home");
        assert_eq!(loaded.heading_counts.h2, 2);
        assert_eq!(loaded.broken_links.len(), 1);
        assert_eq!(loaded.broken_links[0].status_code, None);
        assert!(loaded.has_login_form);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_update_status_rejects_regression() {
        let store = store();
        let job = CrawlJob::new("http://example.com");
        store.create(&job).unwrap();
        store
            .update_status(&job.id, JobStatus::Running, &JobUpdate::default())
            .unwrap();
        store
            .update_status(&job.id, JobStatus::Error, &JobUpdate::failed("boom"))
            .unwrap();

        let result = store.update_status(&job.id, JobStatus::Running, &JobUpdate::default());
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Error);
    }

    #[test]
    fn test_mark_running_only_touches_queued() {
        let store = store();
        let queued = CrawlJob::new("http://a.example");
        let running = CrawlJob::new("http://b.example");
        let done = CrawlJob::new("http://c.example");
        for job in [&queued, &running, &done] {
            store.create(job).unwrap();
        }
        store
            .update_status(&running.id, JobStatus::Running, &JobUpdate::default())
            .unwrap();
        store
            .update_status(&done.id, JobStatus::Running, &JobUpdate::default())
            .unwrap();
        store
            .update_status(&done.id, JobStatus::Completed, &JobUpdate::default())
            .unwrap();

        let mut batch = ids(&[&queued, &running, &done]);
        batch.push("unknown".to_string());
        let transitioned = store.mark_running(&batch).unwrap();

        assert_eq!(transitioned, 1);
        assert_eq!(store.get(&queued.id).unwrap().status, JobStatus::Running);
        assert_eq!(store.get(&running.id).unwrap().status, JobStatus::Running);
        assert_eq!(store.get(&done.id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_mark_running_large_batch_in_one_step() {
        let store = store();
        let jobs: Vec<CrawlJob> = (0..(ID_CHUNK * 2 + 7))
            .map(|i| CrawlJob::new(format!("http://site{}.example", i)))
            .collect();
        for job in &jobs {
            store.create(job).unwrap();
        }
        let batch: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();

        let transitioned = store.mark_running(&batch).unwrap();

        assert_eq!(transitioned, batch.len());
        assert_eq!(
            store.count_by_status(JobStatus::Running).unwrap(),
            batch.len() as u64
        );
        assert_eq!(store.count_by_status(JobStatus::Queued).unwrap(), 0);
    }

    #[test]
    fn test_mark_running_failure_rolls_back_earlier_chunks() {
        let store = store();
        let jobs: Vec<CrawlJob> = (0..(ID_CHUNK + 10))
            .map(|i| CrawlJob::new(format!("http://site{}.example", i)))
            .collect();
        for job in &jobs {
            store.create(job).unwrap();
        }
        // Reject the update of one job that only the second chunk touches
        let rejected = &jobs[ID_CHUNK + 5].id;
        store
            .conn()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER reject_one BEFORE UPDATE ON crawl_jobs
                 WHEN NEW.id = '{}'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                rejected
            ))
            .unwrap();
        let batch: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();

        assert!(store.mark_running(&batch).is_err());

        assert_eq!(store.count_by_status(JobStatus::Running).unwrap(), 0);
        assert_eq!(
            store.count_by_status(JobStatus::Queued).unwrap(),
            jobs.len() as u64
        );
    }

    #[test]
    fn test_mark_running_empty_batch() {
        assert_eq!(store().mark_running(&[]).unwrap(), 0);
    }

    #[test]
    fn test_list_paginated_newest_first() {
        let store = store();
        let oldest = job_created_at("http://1.example", 30);
        let middle = job_created_at("http://2.example", 20);
        let newest = job_created_at("http://3.example", 10);
        for job in [&middle, &oldest, &newest] {
            store.create(job).unwrap();
        }

        let page = store.list_paginated(&ListQuery::new(1, 2, None)).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].id, newest.id);
        assert_eq!(page.results[1].id, middle.id);

        let page = store.list_paginated(&ListQuery::new(2, 2, None)).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, oldest.id);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn test_list_paginated_status_filter() {
        let store = store();
        let a = CrawlJob::new("http://a.example");
        let b = CrawlJob::new("http://b.example");
        store.create(&a).unwrap();
        store.create(&b).unwrap();
        store.mark_running(&ids(&[&b])).unwrap();

        let page = store
            .list_paginated(&ListQuery::new(1, 10, Some(JobStatus::Running)))
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].id, b.id);

        let page = store
            .list_paginated(&ListQuery::new(1, 10, Some(JobStatus::Error)))
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_delete_and_bulk_delete() {
        let store = store();
        let a = CrawlJob::new("http://a.example");
        let b = CrawlJob::new("http://b.example");
        let c = CrawlJob::new("http://c.example");
        for job in [&a, &b, &c] {
            store.create(job).unwrap();
        }

        assert!(store.delete(&a.id).unwrap());
        assert!(!store.delete(&a.id).unwrap());

        let mut batch = ids(&[&a, &b, &c]);
        batch.push("unknown".to_string());
        assert_eq!(store.bulk_delete(&batch).unwrap(), 2);
        assert_eq!(store.count_total().unwrap(), 0);
    }

    #[test]
    fn test_requeue() {
        let store = store();
        let job = CrawlJob::new("http://example.com");
        store.create(&job).unwrap();
        store.mark_running(&ids(&[&job])).unwrap();

        assert!(store.requeue(&job.id).is_err());

        store
            .update_status(&job.id, JobStatus::Error, &JobUpdate::failed("boom"))
            .unwrap();
        let requeued = store.requeue(&job.id).unwrap();

        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.error.is_empty());
        assert!(store.get(&job.id).unwrap().completed_at.is_none());
    }

    #[test]
    fn test_count_by_status() {
        let store = store();
        store.create(&CrawlJob::new("http://a.example")).unwrap();
        store.create(&CrawlJob::new("http://b.example")).unwrap();

        assert_eq!(store.count_by_status(JobStatus::Queued).unwrap(), 2);
        assert_eq!(store.count_by_status(JobStatus::Completed).unwrap(), 0);
        assert_eq!(store.count_total().unwrap(), 2);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");
        let job = CrawlJob::new("http://example.com");

        {
            let store = SqliteJobStore::new(&path).unwrap();
            store.create(&job).unwrap();
        }

        let store = SqliteJobStore::new(&path).unwrap();
        assert_eq!(store.get(&job.id).unwrap().url, "http://example.com");
    }
}
