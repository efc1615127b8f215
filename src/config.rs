//! Pipeline configuration
//!
//! Loaded from YAML, with `BUCKET_NAME` and `TARGET_ROOT` taken from the
//! environment when set:
//!
//! ```yaml
//! bucket: s3://my-activity-bucket
//! landing_prefix: landing
//! source: ghactivity
//! target_root: raw/ghactivity
//! job_id: ghactivity_transform
//! chunk_size: 10000
//! drop_fields: [payload]
//! compression: snappy
//! io_timeout_secs: 60
//! verify: true
//! bookmark:
//!   type: object_store
//! ```

use crate::error::{Error, Result};
use crate::storage::StorageLocation;
use crate::transform::ParquetWriterConfig;
use crate::types::{JsonValue, DEFAULT_CHUNK_SIZE, DEFAULT_DROP_FIELD};
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the bucket
pub const BUCKET_ENV: &str = "BUCKET_NAME";

/// Environment variable overriding the target root
pub const TARGET_ROOT_ENV: &str = "TARGET_ROOT";

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Storage location holding landing archives and output, e.g.
    /// `s3://bucket`, `memory://` or a local directory
    #[serde(default)]
    pub bucket: String,

    /// Prefix archives land under
    #[serde(default = "default_landing_prefix")]
    pub landing_prefix: String,

    /// Source name, the directory below the landing prefix
    #[serde(default = "default_source")]
    pub source: String,

    /// Root of the partitioned output
    #[serde(default = "default_target_root")]
    pub target_root: String,

    /// Job name used for the bookmark and run audit
    #[serde(default = "default_job_id")]
    pub job_id: String,

    /// Maximum records per output object
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Top-level fields removed from every record
    #[serde(default = "default_drop_fields")]
    pub drop_fields: Vec<String>,

    /// Parquet compression codec
    #[serde(default)]
    pub compression: OutputCompression,

    /// Upper bound on every storage call, in seconds (0 disables)
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,

    /// Read the whole archive and fix its column types before writing anything
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Where bookmarks and run records live
    #[serde(default)]
    pub bookmark: BookmarkBackend,
}

fn default_landing_prefix() -> String {
    "landing".to_string()
}

fn default_source() -> String {
    "ghactivity".to_string()
}

fn default_target_root() -> String {
    "raw/ghactivity".to_string()
}

fn default_job_id() -> String {
    "ghactivity_transform".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_drop_fields() -> Vec<String> {
    vec![DEFAULT_DROP_FIELD.to_string()]
}

fn default_io_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            landing_prefix: default_landing_prefix(),
            source: default_source(),
            target_root: default_target_root(),
            job_id: default_job_id(),
            chunk_size: default_chunk_size(),
            drop_fields: default_drop_fields(),
            compression: OutputCompression::default(),
            io_timeout_secs: default_io_timeout_secs(),
            verify: true,
            bookmark: BookmarkBackend::default(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration for a bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Load a config file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config = Self::from_yaml(&content)?.with_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Configuration from the environment alone
    pub fn from_env() -> Result<Self> {
        let config = Self::default().with_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document (without validation)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse pipeline config: {e}")))
    }

    /// Apply `BUCKET_NAME` and `TARGET_ROOT` as returned by `lookup`
    ///
    /// A bucket name without a scheme is taken to be an S3 bucket.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup(BUCKET_ENV).filter(|v| !v.trim().is_empty()) {
            self.bucket = bucket_url(bucket.trim());
        }
        if let Some(root) = lookup(TARGET_ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            self.target_root = root.trim().to_string();
        }
        self
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::config(format!(
                "bucket is not set (config file or {BUCKET_ENV})"
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if self.job_id.trim().is_empty() {
            return Err(Error::config("job_id cannot be empty"));
        }
        if self.source.trim_matches('/').is_empty() {
            return Err(Error::config("source cannot be empty"));
        }
        if self.drop_fields.iter().any(|f| f.is_empty()) {
            return Err(Error::config("drop_fields cannot contain an empty name"));
        }
        match &self.bookmark {
            BookmarkBackend::File { path } if path.as_os_str().is_empty() => {
                return Err(Error::config("bookmark file path cannot be empty"));
            }
            BookmarkBackend::ObjectStore { url } => {
                let target = url.as_deref().unwrap_or(&self.bucket);
                if StorageLocation::is_local_url(target) {
                    return Err(Error::config(format!(
                        "object_store bookmarks need conditional updates, which the local \
                         directory '{target}' does not support; use the file bookmark backend"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Storage call bound, `None` when disabled
    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_secs > 0).then(|| Duration::from_secs(self.io_timeout_secs))
    }

    /// Parquet writer settings
    pub fn parquet_config(&self) -> ParquetWriterConfig {
        ParquetWriterConfig::new().with_compression(self.compression.codec())
    }

    /// Job config registered with the bookmark store
    pub fn job_config(&self) -> JsonValue {
        json!({
            "bucket": self.bucket,
            "landing_prefix": self.landing_prefix,
            "source": self.source,
            "target_root": self.target_root,
            "chunk_size": self.chunk_size,
            "drop_fields": self.drop_fields,
            "compression": self.compression,
        })
    }
}

fn bucket_url(name: &str) -> String {
    if name.contains("://") {
        name.to_string()
    } else {
        format!("s3://{name}")
    }
}

// ============================================================================
// Output Compression
// ============================================================================

/// Parquet compression codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
    Brotli,
}

impl OutputCompression {
    /// Parquet codec with default level
    pub fn codec(self) -> Compression {
        match self {
            OutputCompression::Uncompressed => Compression::UNCOMPRESSED,
            OutputCompression::Snappy => Compression::SNAPPY,
            OutputCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            OutputCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            OutputCompression::Lz4 => Compression::LZ4_RAW,
            OutputCompression::Brotli => Compression::BROTLI(BrotliLevel::default()),
        }
    }
}

// ============================================================================
// Bookmark Backend
// ============================================================================

/// Bookmark store selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookmarkBackend {
    /// Process-local, lost on exit
    Memory,
    /// A JSON document on local disk
    File { path: PathBuf },
    /// `_jobs/` and `_job_runs/` objects; defaults to the data bucket
    ObjectStore {
        #[serde(default)]
        url: Option<String>,
    },
}

impl Default for BookmarkBackend {
    fn default() -> Self {
        BookmarkBackend::ObjectStore { url: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_yaml("bucket: memory://").unwrap();
        assert_eq!(config.landing_prefix, "landing");
        assert_eq!(config.source, "ghactivity");
        assert_eq!(config.target_root, "raw/ghactivity");
        assert_eq!(config.job_id, "ghactivity_transform");
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.drop_fields, vec!["payload".to_string()]);
        assert_eq!(config.compression, OutputCompression::Snappy);
        assert_eq!(config.io_timeout(), Some(Duration::from_secs(60)));
        assert!(config.verify);
        assert_eq!(config.bookmark, BookmarkBackend::ObjectStore { url: None });
        config.validate().unwrap();
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
bucket: s3://activity
landing_prefix: inbox
source: events
target_root: curated/events
job_id: events_job
chunk_size: 500
drop_fields: [payload, org]
compression: zstd
io_timeout_secs: 0
verify: false
bookmark:
  type: file
  path: /var/lib/pipeline/bookmarks.json
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.drop_fields.len(), 2);
        assert_eq!(config.io_timeout(), None);
        assert!(!config.verify);
        assert_eq!(config.parquet_config().file_extension(), "zstd.parquet");
        assert_eq!(
            config.bookmark,
            BookmarkBackend::File {
                path: PathBuf::from("/var/lib/pipeline/bookmarks.json")
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::new("memory://").with_env_overrides(env(&[
            ("BUCKET_NAME", "activity-bucket"),
            ("TARGET_ROOT", "raw/other"),
        ]));
        assert_eq!(config.bucket, "s3://activity-bucket");
        assert_eq!(config.target_root, "raw/other");

        let config = PipelineConfig::new("memory://")
            .with_env_overrides(env(&[("BUCKET_NAME", "gs://kept-as-is")]));
        assert_eq!(config.bucket, "gs://kept-as-is");
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let config =
            PipelineConfig::new("memory://").with_env_overrides(env(&[("BUCKET_NAME", "  ")]));
        assert_eq!(config.bucket, "memory://");
    }

    #[test]
    fn test_validation() {
        assert!(PipelineConfig::default().validate().is_err());

        let mut config = PipelineConfig::new("memory://");
        config.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));

        let mut config = PipelineConfig::new("memory://");
        config.bookmark = BookmarkBackend::File {
            path: PathBuf::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_object_store_bookmarks_need_a_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().to_str().unwrap();

        let err = PipelineConfig::new(local).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("file bookmark backend"), "{err}");

        let err = PipelineConfig::new(format!("file://{local}"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let mut config = PipelineConfig::new("memory://");
        config.bookmark = BookmarkBackend::ObjectStore {
            url: Some(local.to_string()),
        };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new(local);
        config.bookmark = BookmarkBackend::File {
            path: dir.path().join("bookmarks.json"),
        };
        config.validate().unwrap();

        PipelineConfig::new("s3://activity").validate().unwrap();
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let err = PipelineConfig::from_yaml("bucket: memory://\ncompression: lzma").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_job_config() {
        let config = PipelineConfig::new("memory://");
        let job = config.job_config();
        assert_eq!(job["source"], "ghactivity");
        assert_eq!(job["compression"], "snappy");
        assert_eq!(job["chunk_size"], 10_000);
    }
}
