//! Object-store bookmark store
//!
//! Layout, relative to the configured location:
//!
//! ```text
//! _jobs/{job_id}.json                          one document per job
//! _job_runs/{job_id}/{run_timestamp_us}.json   one document per run
//! ```
//!
//! Job documents are updated with conditional puts (`PutMode::Create` for a
//! new job, `PutMode::Update` with the version read for an existing one).
//! A failed precondition means another writer got in first; the update is
//! re-read and retried.

use super::store::{duplicate_run, BookmarkStore};
use super::types::{BookmarkAdvance, JobBookmark, JobRunRecord};
use crate::error::{Error, Result};
use crate::storage::StorageLocation;
use crate::types::JsonValue;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{PutMode, PutOptions};
use tracing::debug;

/// Default number of compare-and-set attempts per update
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

const JOBS_DIR: &str = "_jobs";
const RUNS_DIR: &str = "_job_runs";

/// Bookmark store backed by any `object_store` location with conditional puts
#[derive(Debug, Clone)]
pub struct ObjectStoreBookmarkStore {
    location: StorageLocation,
    max_attempts: u32,
}

impl ObjectStoreBookmarkStore {
    pub fn new(location: StorageLocation) -> Self {
        Self {
            location,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the compare-and-set retry budget
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn job_path(job_id: &str) -> String {
        format!("{JOBS_DIR}/{job_id}.json")
    }

    fn run_dir(job_id: &str) -> String {
        format!("{RUNS_DIR}/{job_id}/")
    }

    fn run_path(run: &JobRunRecord) -> String {
        // Zero padded so that listing order is chronological
        format!(
            "{}{:020}.json",
            Self::run_dir(&run.job_id),
            run.run_timestamp.timestamp_micros()
        )
    }

    /// Read-modify-write a job document
    ///
    /// `apply` returns whether the document changed along with the output;
    /// unchanged documents are not written back.
    async fn compare_and_set<T, F>(&self, job_id: &str, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut JobBookmark) -> (bool, T) + Send,
        T: Send,
    {
        let path = Self::job_path(job_id);
        for attempt in 1..=self.max_attempts {
            let (mut job, mode) = match self.location.get_versioned(&path).await? {
                Some((data, version)) => (
                    decode_job(&path, &data)?,
                    PutMode::Update(version),
                ),
                None => (JobBookmark::new(job_id, JsonValue::Null), PutMode::Create),
            };

            let (changed, output) = apply(&mut job);
            if !changed {
                return Ok(output);
            }

            let body = Bytes::from(serde_json::to_vec_pretty(&job)?);
            match self
                .location
                .put_opts(&path, body, PutOptions::from(mode))
                .await
            {
                Ok(()) => return Ok(output),
                Err(e) if is_lost_race(&e) => {
                    debug!(job_id, attempt, "Bookmark changed concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::BookmarkConflict {
            job_id: job_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

fn decode_job(path: &str, data: &[u8]) -> Result<JobBookmark> {
    serde_json::from_slice(data)
        .map_err(|e| Error::bookmark(format!("Failed to parse {path}: {e}")))
}

fn is_lost_race(err: &Error) -> bool {
    matches!(
        err,
        Error::Storage(
            object_store::Error::Precondition { .. } | object_store::Error::AlreadyExists { .. }
        )
    )
}

#[async_trait]
impl BookmarkStore for ObjectStoreBookmarkStore {
    async fn get_bookmark(&self, job_id: &str) -> Result<JobBookmark> {
        let path = Self::job_path(job_id);
        let data = self.location.get(&path).await?;
        decode_job(&path, &data)
    }

    async fn register_job(&self, job_id: &str, config: JsonValue) -> Result<JobBookmark> {
        self.compare_and_set(job_id, |job| {
            job.apply_config(config.clone());
            (true, job.clone())
        })
        .await
    }

    async fn advance_bookmark(&self, job_id: &str, file_name: &str) -> Result<BookmarkAdvance> {
        self.compare_and_set(job_id, |job| {
            let outcome = job.apply_advance(file_name);
            (outcome.is_advanced(), outcome)
        })
        .await
    }

    async fn record_run(&self, run: &JobRunRecord) -> Result<()> {
        let body = Bytes::from(serde_json::to_vec_pretty(run)?);
        match self
            .location
            .put_opts(&Self::run_path(run), body, PutOptions::from(PutMode::Create))
            .await
        {
            Err(e) if is_lost_race(&e) => Err(duplicate_run(run)),
            other => other,
        }
    }

    async fn list_runs(&self, job_id: &str) -> Result<Vec<JobRunRecord>> {
        let keys = self.location.list(&Self::run_dir(job_id)).await?;
        let mut runs = Vec::with_capacity(keys.len());
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            let data = self.location.get(key).await?;
            let run: JobRunRecord = serde_json::from_slice(&data)
                .map_err(|e| Error::bookmark(format!("Failed to parse {key}: {e}")))?;
            runs.push(run);
        }
        runs.sort_by_key(|r| r.run_timestamp);
        Ok(runs)
    }
}
