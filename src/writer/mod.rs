//! Partitioned writer
//!
//! Uploads encoded chunks under Hive-style date partitions derived from the
//! archive key:
//!
//! ```text
//! {target_root}/year=2024/month=03/dayofmonth=15/part-2024-03-15-9-{uuid}.snappy.parquet
//! ```
//!
//! Every object gets a fresh UUID, so reprocessing an archive adds objects
//! next to the earlier ones and never overwrites them.

use crate::archive::ArchiveKey;
use crate::error::{Error, Result};
use crate::storage::StorageLocation;
use crate::transform::EncodedChunk;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// An object written to the target location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputObject {
    /// Key relative to the bucket
    pub path: String,
    /// Full URI, e.g. `s3://bucket/raw/ghactivity/...`
    pub uri: String,
    /// Records in the object
    pub records: usize,
    /// Object size in bytes
    pub bytes: usize,
    /// Index of the chunk the object was encoded from
    pub chunk_index: usize,
}

/// Writes encoded chunks into date partitions
#[derive(Debug, Clone)]
pub struct PartitionedWriter {
    location: StorageLocation,
    target_root: String,
    extension: String,
}

impl PartitionedWriter {
    /// Create a writer under `target_root` of `location`
    ///
    /// `extension` is the object suffix without the leading dot, e.g.
    /// `snappy.parquet`.
    pub fn new(
        location: StorageLocation,
        target_root: &str,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            location,
            target_root: target_root.trim_matches('/').to_string(),
            extension: extension.into(),
        }
    }

    /// Target root relative to the bucket
    pub fn target_root(&self) -> &str {
        &self.target_root
    }

    /// Partition directory for an archive, relative to the bucket
    pub fn partition_dir(&self, key: &ArchiveKey) -> String {
        if self.target_root.is_empty() {
            key.partition_path()
        } else {
            format!("{}/{}", self.target_root, key.partition_path())
        }
    }

    /// Object file name for one chunk
    pub fn object_name(&self, key: &ArchiveKey, id: Uuid) -> String {
        format!("{}-{id}.{}", key.object_stem(), self.extension)
    }

    /// Full relative key for one chunk
    pub fn object_path(&self, key: &ArchiveKey, id: Uuid) -> String {
        format!("{}/{}", self.partition_dir(key), self.object_name(key, id))
    }

    /// URI prefix shared by every object written for an archive
    pub fn target_pattern(&self, key: &ArchiveKey) -> String {
        self.location
            .uri(&format!("{}/{}", self.partition_dir(key), key.object_stem()))
    }

    /// Upload one encoded chunk
    ///
    /// Fails with `Timeout` when the configured I/O bound elapses and with
    /// `WriteFailure` for any other storage error.
    pub async fn write(
        &self,
        chunk: &EncodedChunk,
        key: &ArchiveKey,
        id: Uuid,
    ) -> Result<OutputObject> {
        let path = self.object_path(key, id);
        let uri = match self.location.put(&path, chunk.data.clone()).await {
            Ok(uri) => uri,
            Err(e @ Error::Timeout { .. }) => return Err(e),
            Err(e) => return Err(Error::write_failure(&path, e.to_string())),
        };

        debug!(
            uri = %uri,
            chunk = chunk.index,
            records = chunk.records,
            bytes = chunk.data.len(),
            "Wrote object"
        );

        Ok(OutputObject {
            path,
            uri,
            records: chunk.records,
            bytes: chunk.data.len(),
            chunk_index: chunk.index,
        })
    }
}
