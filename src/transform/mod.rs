//! Chunk transformer
//!
//! Projects records and encodes each chunk as Parquet in memory.
//!
//! # Overview
//!
//! This module provides:
//! - `ChunkTransformer` - drops oversized fields and encodes chunks
//! - `ArchiveSchema` - per-archive column types, reconciled chunk by chunk
//! - Parquet encode/decode helpers and the writer configuration

mod parquet;
mod schema;
mod transformer;

pub use parquet::{decode_parquet, encode_batch, ParquetWriterConfig};
pub use schema::{arrow_to_json, records_to_batch, ArchiveSchema};
pub use transformer::{drop_fields, ChunkTransformer, EncodedChunk};
