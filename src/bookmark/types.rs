//! Bookmark and run audit types
//!
//! These types are serialized to JSON by every store.

use crate::archive::is_later_archive;
use crate::error::ErrorKind;
use crate::pipeline::Stage;
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-job progress marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBookmark {
    pub job_id: String,
    /// Latest archive processed to completion
    #[serde(default)]
    pub last_processed_file: Option<String>,
    /// Free-form job configuration, as registered
    #[serde(default)]
    pub config: JsonValue,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every change
    #[serde(default)]
    pub revision: u64,
}

impl JobBookmark {
    /// Create a job with no processed archive
    pub fn new(job_id: impl Into<String>, config: JsonValue) -> Self {
        Self {
            job_id: job_id.into(),
            last_processed_file: None,
            config,
            updated_at: Utc::now(),
            revision: 0,
        }
    }

    /// Replace the job config, leaving the bookmark untouched
    pub fn apply_config(&mut self, config: JsonValue) {
        self.config = config;
        self.touch();
    }

    /// Move the bookmark to `file_name` unless it already points at an equal
    /// or later archive
    pub fn apply_advance(&mut self, file_name: &str) -> BookmarkAdvance {
        if let Some(current) = &self.last_processed_file {
            if !is_later_archive(file_name, current) {
                return BookmarkAdvance::Unchanged {
                    current: current.clone(),
                };
            }
        }
        let previous = self.last_processed_file.replace(file_name.to_string());
        self.touch();
        BookmarkAdvance::Advanced { previous }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }
}

/// Outcome of a bookmark advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookmarkAdvance {
    /// The bookmark moved forward
    Advanced { previous: Option<String> },
    /// The stored archive is equal or newer; nothing changed
    Unchanged { current: String },
}

impl BookmarkAdvance {
    pub fn is_advanced(&self) -> bool {
        matches!(self, BookmarkAdvance::Advanced { .. })
    }
}

/// One audit entry per run, identified by `(job_id, run_timestamp)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub job_id: String,
    pub run_timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub source_file: String,
    #[serde(default)]
    pub target_pattern: Option<String>,
    /// Stage the run failed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default)]
    pub records: usize,
    #[serde(default)]
    pub objects_written: usize,
}

impl JobRunRecord {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

/// Everything a single-document store persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkDocument {
    #[serde(default)]
    pub jobs: BTreeMap<String, JobBookmark>,
    #[serde(default)]
    pub runs: BTreeMap<String, Vec<JobRunRecord>>,
}

impl BookmarkDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Job entry, created empty if absent
    pub fn job_mut(&mut self, job_id: &str) -> &mut JobBookmark {
        self.jobs
            .entry(job_id.to_string())
            .or_insert_with(|| JobBookmark::new(job_id, JsonValue::Null))
    }

    /// Append a run record; `false` if one with the same identity exists
    pub fn push_run(&mut self, run: &JobRunRecord) -> bool {
        let runs = self.runs.entry(run.job_id.clone()).or_default();
        if runs.iter().any(|r| r.run_timestamp == run.run_timestamp) {
            return false;
        }
        let at = runs.partition_point(|r| r.run_timestamp <= run.run_timestamp);
        runs.insert(at, run.clone());
        true
    }

    /// Runs of a job, oldest first
    pub fn runs(&self, job_id: &str) -> Vec<JobRunRecord> {
        self.runs.get(job_id).cloned().unwrap_or_default()
    }
}
