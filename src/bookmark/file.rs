//! File-backed bookmark store
//!
//! Keeps every job and run in one JSON document on disk. Each change is
//! written to a temp file and renamed into place, so a crash never leaves a
//! half-written document behind.

use super::store::{duplicate_run, job_not_found, BookmarkStore};
use super::types::{BookmarkAdvance, BookmarkDocument, JobBookmark, JobRunRecord};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Bookmark store persisted as a JSON file
#[derive(Debug)]
pub struct FileBookmarkStore {
    path: PathBuf,
    /// Cached document; the lock also serializes writers
    document: Mutex<BookmarkDocument>,
}

impl FileBookmarkStore {
    /// Open a store, loading the existing document if present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::bookmark(format!("Failed to read bookmark file: {e}")))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::bookmark(format!("Failed to parse bookmark file: {e}")))?
        } else {
            BookmarkDocument::new()
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, document: &BookmarkDocument) -> Result<()> {
        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| Error::bookmark(format!("Failed to serialize bookmarks: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::bookmark(format!("Failed to create bookmark directory: {e}"))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::bookmark(format!("Failed to write bookmark file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::bookmark(format!("Failed to rename bookmark file: {e}")))?;

        Ok(())
    }

    /// Apply `change` to a copy of the document and persist it
    ///
    /// The cached document is only replaced once the write succeeded.
    async fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut BookmarkDocument) -> Result<(bool, T)> + Send,
        T: Send,
    {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let (changed, output) = change(&mut next)?;
        if changed {
            self.save(&next).await?;
            *document = next;
        }
        Ok(output)
    }
}

#[async_trait]
impl BookmarkStore for FileBookmarkStore {
    async fn get_bookmark(&self, job_id: &str) -> Result<JobBookmark> {
        let document = self.document.lock().await;
        document
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| job_not_found(job_id))
    }

    async fn register_job(&self, job_id: &str, config: JsonValue) -> Result<JobBookmark> {
        self.update(|document| {
            let job = document.job_mut(job_id);
            job.apply_config(config);
            Ok((true, job.clone()))
        })
        .await
    }

    async fn advance_bookmark(&self, job_id: &str, file_name: &str) -> Result<BookmarkAdvance> {
        self.update(|document| {
            let outcome = document.job_mut(job_id).apply_advance(file_name);
            Ok((outcome.is_advanced(), outcome))
        })
        .await
    }

    async fn record_run(&self, run: &JobRunRecord) -> Result<()> {
        self.update(|document| {
            if document.push_run(run) {
                Ok((true, ()))
            } else {
                Err(duplicate_run(run))
            }
        })
        .await
    }

    async fn list_runs(&self, job_id: &str) -> Result<Vec<JobRunRecord>> {
        Ok(self.document.lock().await.runs(job_id))
    }
}
