//! Process-local bookmark store

use super::store::{duplicate_run, job_not_found, BookmarkStore};
use super::types::{BookmarkAdvance, BookmarkDocument, JobBookmark, JobRunRecord};
use crate::error::Result;
use crate::types::JsonValue;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Bookmark store held in memory; lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    document: RwLock<BookmarkDocument>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn get_bookmark(&self, job_id: &str) -> Result<JobBookmark> {
        let document = self.document.read().await;
        document
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| job_not_found(job_id))
    }

    async fn register_job(&self, job_id: &str, config: JsonValue) -> Result<JobBookmark> {
        let mut document = self.document.write().await;
        let job = document.job_mut(job_id);
        job.apply_config(config);
        Ok(job.clone())
    }

    async fn advance_bookmark(&self, job_id: &str, file_name: &str) -> Result<BookmarkAdvance> {
        let mut document = self.document.write().await;
        Ok(document.job_mut(job_id).apply_advance(file_name))
    }

    async fn record_run(&self, run: &JobRunRecord) -> Result<()> {
        let mut document = self.document.write().await;
        if document.push_run(run) {
            Ok(())
        } else {
            Err(duplicate_run(run))
        }
    }

    async fn list_runs(&self, job_id: &str) -> Result<Vec<JobRunRecord>> {
        Ok(self.document.read().await.runs(job_id))
    }
}
