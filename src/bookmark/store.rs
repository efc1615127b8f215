//! Bookmark store trait

use super::types::{BookmarkAdvance, JobBookmark, JobRunRecord};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;

/// Persistent per-job bookmark and append-only run audit
///
/// `advance_bookmark` is a compare-and-set: it never moves a bookmark
/// backwards, no matter how many processes race on the same job.
#[async_trait]
pub trait BookmarkStore: Send + Sync + std::fmt::Debug {
    /// Current bookmark of a job; `NotFound` if the job is unknown
    async fn get_bookmark(&self, job_id: &str) -> Result<JobBookmark>;

    /// Create a job or replace its config without touching the bookmark
    async fn register_job(&self, job_id: &str, config: JsonValue) -> Result<JobBookmark>;

    /// Move the bookmark to `file_name` if it is later than the stored one
    ///
    /// Creates the job when absent. Fails with `BookmarkConflict` when
    /// concurrent updates exhaust the retry budget.
    async fn advance_bookmark(&self, job_id: &str, file_name: &str) -> Result<BookmarkAdvance>;

    /// Append a run record; a record with the same identity is rejected
    async fn record_run(&self, run: &JobRunRecord) -> Result<()>;

    /// Run records of a job, oldest first
    async fn list_runs(&self, job_id: &str) -> Result<Vec<JobRunRecord>>;
}

pub(crate) fn job_not_found(job_id: &str) -> Error {
    Error::NotFound {
        path: format!("job '{job_id}'"),
    }
}

pub(crate) fn duplicate_run(run: &JobRunRecord) -> Error {
    Error::bookmark(format!(
        "run of job '{}' at {} already recorded",
        run.job_id,
        run.run_timestamp.to_rfc3339()
    ))
}
