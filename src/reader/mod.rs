//! Decompression and record reader
//!
//! Turns a compressed archive payload into a lazy sequence of [`Chunk`]s.
//!
//! # Overview
//!
//! - `decompress` - wraps a payload in the decoder implied by its extension
//! - `ChunkReader` - line-oriented JSON parser yielding bounded chunks
//!
//! Chunk boundaries only bound memory; they carry no meaning downstream.
//! A line that is not a JSON object aborts the archive with
//! `MalformedRecord`. Blank lines are ignored.

mod chunk;
mod decompress;

pub use chunk::{Chunk, ChunkReader};
pub use decompress::{compress, decompress, ArchiveReader};
