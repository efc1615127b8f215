//! Archive transform pipeline
//!
//! Runs one archive through fetch, decompression, chunked parsing, field
//! projection, Parquet encoding and partitioned writes, then advances the
//! job bookmark and appends a run record.
//!
//! # Overview
//!
//! This module provides:
//! - `Pipeline` - the orchestrator, one `run` per archive
//! - `Stage` - run lifecycle, reported on failure
//! - `RunResult` - what the invoker gets back

mod types;

pub use types::{RunFailure, RunResult, Stage};

use crate::archive::ArchiveKey;
use crate::bookmark::{open_store, BookmarkAdvance, BookmarkStore, JobBookmark, JobRunRecord};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::fetch::ArchiveFetcher;
use crate::reader::ChunkReader;
use crate::storage::StorageLocation;
use crate::transform::{ChunkTransformer, EncodedChunk, ParquetWriterConfig};
use crate::writer::{OutputObject, PartitionedWriter};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transforms landing archives into partitioned Parquet
#[derive(Debug, Clone)]
pub struct Pipeline {
    job_id: String,
    fetcher: ArchiveFetcher,
    writer: PartitionedWriter,
    bookmarks: Arc<dyn BookmarkStore>,
    chunk_size: usize,
    drop_fields: Vec<String>,
    parquet: ParquetWriterConfig,
    verify: bool,
}

impl Pipeline {
    /// Build a pipeline over an existing location and bookmark store
    pub fn new(
        config: &PipelineConfig,
        location: StorageLocation,
        bookmarks: Arc<dyn BookmarkStore>,
    ) -> Self {
        let parquet = config.parquet_config();
        Self {
            job_id: config.job_id.clone(),
            fetcher: ArchiveFetcher::new(location.clone(), &config.landing_prefix, &config.source),
            writer: PartitionedWriter::new(location, &config.target_root, parquet.file_extension()),
            bookmarks,
            chunk_size: config.chunk_size,
            drop_fields: config.drop_fields.clone(),
            parquet,
            verify: config.verify,
        }
    }

    /// Open the configured bucket and bookmark store
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut location = StorageLocation::parse(&config.bucket)?;
        if let Some(limit) = config.io_timeout() {
            location = location.with_timeout(limit);
        }
        let bookmarks = open_store(&config.bookmark, &location)?;
        info!(
            bucket = %config.bucket,
            scheme = location.scheme(),
            job_id = %config.job_id,
            "Opened pipeline"
        );
        Ok(Self::new(config, location, bookmarks))
    }

    /// Job whose bookmark this pipeline advances
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Bookmark and run audit store
    pub fn bookmarks(&self) -> &Arc<dyn BookmarkStore> {
        &self.bookmarks
    }

    /// Reader of the landing area
    pub fn fetcher(&self) -> &ArchiveFetcher {
        &self.fetcher
    }

    /// Writer of the partitioned output
    pub fn writer(&self) -> &PartitionedWriter {
        &self.writer
    }

    /// Register the job and its config with the bookmark store
    pub async fn register(&self, config: &PipelineConfig) -> Result<JobBookmark> {
        self.bookmarks
            .register_job(&self.job_id, config.job_config())
            .await
    }

    /// Process one archive to completion or failure
    ///
    /// Never panics and never returns an error: failures are reported in the
    /// result and the run record. Dropping the future before it completes
    /// leaves the bookmark untouched.
    pub async fn run(&self, file_name: &str) -> RunResult {
        let started = Instant::now();
        let run_timestamp = Utc::now();
        let mut progress = Progress::default();

        info!(file = file_name, job_id = %self.job_id, "Processing archive");

        let (pattern, outcome) = match ArchiveKey::parse(file_name) {
            Ok(key) => {
                let pattern = self.writer.target_pattern(&key);
                let outcome = self.execute(&key, &mut progress).await;
                (Some(pattern), outcome)
            }
            Err(e) => (None, Err(e)),
        };

        let result = match outcome {
            Ok(()) => {
                progress.enter(Stage::Completed);
                info!(
                    file = file_name,
                    records = progress.records,
                    objects = progress.objects.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Archive completed"
                );
                RunResult {
                    last_run_src_file_name: file_name.to_string(),
                    last_run_tgt_file_pattern: pattern,
                    status_code: 200,
                    records: progress.records,
                    objects: progress.uris(),
                    error: None,
                }
            }
            Err(e) => {
                let failure = RunFailure::new(progress.stage, &e);
                progress.enter(Stage::Errored);
                warn!(
                    file = file_name,
                    stage = %failure.stage,
                    kind = ?failure.kind,
                    objects = progress.objects.len(),
                    error = %e,
                    "Archive failed"
                );
                RunResult {
                    last_run_src_file_name: file_name.to_string(),
                    last_run_tgt_file_pattern: pattern,
                    status_code: failure.kind.status_code(),
                    records: progress.records,
                    objects: progress.uris(),
                    error: Some(failure),
                }
            }
        };

        let record = JobRunRecord {
            job_id: self.job_id.clone(),
            run_timestamp,
            status_code: result.status_code,
            source_file: result.last_run_src_file_name.clone(),
            target_pattern: result.last_run_tgt_file_pattern.clone(),
            stage: result.error.as_ref().map(|f| f.stage),
            error_kind: result.error.as_ref().map(|f| f.kind),
            error_detail: result.error.as_ref().map(|f| f.message.clone()),
            records: result.records,
            objects_written: result.objects.len(),
        };
        if let Err(e) = self.bookmarks.record_run(&record).await {
            warn!(job_id = %self.job_id, file = file_name, error = %e, "Failed to record run");
        }

        result
    }

    /// Run each archive in turn
    pub async fn run_all<I, S>(&self, file_names: I) -> Vec<RunResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for file_name in file_names {
            results.push(self.run(file_name.as_ref()).await);
        }
        results
    }

    async fn execute(&self, key: &ArchiveKey, progress: &mut Progress) -> Result<()> {
        progress.enter(Stage::Fetching);
        let payload = self.fetcher.fetch(key).await?;

        progress.enter(Stage::Reading);
        let compression = key.compression();
        let mut transformer = ChunkTransformer::new(self.drop_fields.clone(), self.parquet.clone());
        if self.verify {
            let mut survey = ChunkReader::new(payload.clone(), compression, self.chunk_size)?;
            while let Some(chunk) = survey.next_chunk().await? {
                transformer.observe(chunk)?;
            }
            transformer.fix_schema();
            debug!(
                file = %key,
                records = survey.records_read(),
                columns = transformer.schema().len(),
                "Verified archive"
            );
        }

        let reader = ChunkReader::new(payload, compression, self.chunk_size)?;
        let mut in_flight = InFlightWrite::default();
        let written = self
            .write_chunks(key, reader, &mut transformer, &mut in_flight, progress)
            .await;
        if let Err(e) = written {
            // Let the pending write land so the result lists every object written
            if let Ok(Some(object)) = in_flight.settle().await {
                progress.record(object);
            }
            return Err(e);
        }

        progress.enter(Stage::Committing);
        match self.bookmarks.advance_bookmark(&self.job_id, key.file_name()).await? {
            BookmarkAdvance::Advanced { previous } => {
                debug!(job_id = %self.job_id, file = %key, ?previous, "Advanced bookmark");
            }
            BookmarkAdvance::Unchanged { current } => {
                warn!(
                    job_id = %self.job_id,
                    file = %key,
                    current = %current,
                    "Bookmark already at a later archive, left unchanged"
                );
            }
        }
        Ok(())
    }

    /// Read, encode and write every chunk; at most one write is in flight
    async fn write_chunks(
        &self,
        key: &ArchiveKey,
        mut reader: ChunkReader,
        transformer: &mut ChunkTransformer,
        in_flight: &mut InFlightWrite,
        progress: &mut Progress,
    ) -> Result<()> {

        while let Some(chunk) = reader.next_chunk().await? {
            progress.enter(Stage::Transforming);
            let encoded = transformer.transform(chunk)?;
            info!(
                file = %key,
                chunk = encoded.index,
                records = encoded.records,
                columns = encoded.columns,
                bytes = encoded.data.len(),
                "Encoded chunk"
            );

            progress.enter(Stage::Writing);
            if let Some(object) = in_flight.settle().await? {
                progress.record(object);
            }
            in_flight.start(self.spawn_write(encoded, key));
            progress.enter(Stage::Reading);
        }

        if in_flight.is_pending() {
            progress.enter(Stage::Writing);
            if let Some(object) = in_flight.settle().await? {
                progress.record(object);
            }
        }
        Ok(())
    }

    fn spawn_write(&self, encoded: EncodedChunk, key: &ArchiveKey) -> JoinHandle<Result<OutputObject>> {
        let writer = self.writer.clone();
        let key = key.clone();
        tokio::spawn(async move { writer.write(&encoded, &key, Uuid::new_v4()).await })
    }
}

/// Running totals of one archive run
#[derive(Debug)]
struct Progress {
    stage: Stage,
    records: usize,
    objects: Vec<OutputObject>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            stage: Stage::Start,
            records: 0,
            objects: Vec::new(),
        }
    }
}

impl Progress {
    fn enter(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
    }

    fn record(&mut self, object: OutputObject) {
        self.records += object.records;
        self.objects.push(object);
    }

    fn uris(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.uri.clone()).collect()
    }
}

/// The single write allowed in flight; aborted if the run stops early
#[derive(Debug, Default)]
struct InFlightWrite(Option<JoinHandle<Result<OutputObject>>>);

impl InFlightWrite {
    fn is_pending(&self) -> bool {
        self.0.is_some()
    }

    fn start(&mut self, handle: JoinHandle<Result<OutputObject>>) {
        debug_assert!(self.0.is_none(), "a write is already in flight");
        self.0 = Some(handle);
    }

    /// Wait for the pending write, if any
    async fn settle(&mut self) -> Result<Option<OutputObject>> {
        match self.0.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Other(format!("Write task failed: {e}")))?
                .map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for InFlightWrite {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
