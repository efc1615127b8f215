// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # ghactivity-transform
//!
//! Incremental transform of hour-sliced GitHub activity archives into
//! date-partitioned Parquet.
//!
//! ## Features
//!
//! - **Any object store**: S3, GCS, Azure, local directories and memory
//! - **Bounded memory**: archives are parsed and encoded in fixed-size chunks
//! - **No partial output on corrupt input**: archives are read through and typed before the first write
//! - **Job bookmarks**: a compare-and-set bookmark per job plus a run audit trail
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ghactivity_transform::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> ghactivity_transform::Result<()> {
//!     let config = PipelineConfig::new("s3://activity-bucket");
//!     let pipeline = Pipeline::from_config(&config)?;
//!
//!     let result = pipeline.run("2024-03-15-9.json.gz").await;
//!     println!("{}", serde_json::to_string(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! landing/ghactivity/2024-03-15-9.json.gz
//!          │
//!   ┌──────┴──────┐   ┌────────────┐   ┌─────────────┐   ┌──────────────────┐
//!   │ ArchiveFetch│ → │ ChunkReader│ → │ Transformer │ → │ PartitionedWriter│
//!   │  (get)      │   │ gunzip+jsonl   │ drop+parquet│   │ year=/month=/... │
//!   └─────────────┘   └────────────┘   └─────────────┘   └────────┬─────────┘
//!                                                                 │
//!                                                   ┌─────────────┴──────────┐
//!                                                   │ BookmarkStore (CAS)    │
//!                                                   │ advance + run record   │
//!                                                   └────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Common types and type aliases
pub mod types;

/// Archive key parsing and ordering
pub mod archive;

/// Object storage access
pub mod storage;

/// Landing archive retrieval
pub mod fetch;

/// Decompression and chunked JSON-lines reading
pub mod reader;

/// Field projection and Parquet encoding
pub mod transform;

/// Partitioned output writes
pub mod writer;

/// Job bookmarks and run audit
pub mod bookmark;

/// Per-archive orchestration
pub mod pipeline;

/// Object-created notifications
pub mod trigger;

/// Pipeline configuration
pub mod config;

/// Command-line interface
pub mod cli;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use archive::{ArchiveCompression, ArchiveKey};
pub use bookmark::{BookmarkAdvance, BookmarkStore, JobBookmark, JobRunRecord};
pub use config::PipelineConfig;
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{Pipeline, RunResult, Stage};
pub use storage::StorageLocation;
pub use types::{JsonObject, JsonValue, Record};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
