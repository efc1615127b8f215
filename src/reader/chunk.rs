//! Chunked JSON-lines reader

use super::decompress::{decompress, ArchiveReader};
use crate::archive::ArchiveCompression;
use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};
use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Upper bound on up-front allocation for a chunk's record vector
const MAX_PREALLOCATED_RECORDS: usize = 1024;

/// An ordered batch of records drawn from one archive
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of this chunk within the archive (0-based)
    pub index: usize,
    /// Line number (1-based) of the first record in this chunk
    pub first_line: usize,
    /// Records in source order
    pub records: Vec<Record>,
}

impl Chunk {
    /// Number of records in the chunk
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the chunk holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lazy producer of bounded-size chunks over a compressed payload
///
/// The reader cannot rewind; to start over, build a new one from the same
/// payload.
pub struct ChunkReader {
    lines: Lines<BufReader<ArchiveReader>>,
    chunk_size: usize,
    next_index: usize,
    line_number: usize,
    records_read: usize,
    exhausted: bool,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("chunk_size", &self.chunk_size)
            .field("next_index", &self.next_index)
            .field("line_number", &self.line_number)
            .field("records_read", &self.records_read)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl ChunkReader {
    /// Create a reader yielding chunks of at most `chunk_size` records
    pub fn new(payload: Bytes, compression: ArchiveCompression, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        Ok(Self {
            lines: BufReader::new(decompress(payload, compression)).lines(),
            chunk_size,
            next_index: 0,
            line_number: 0,
            records_read: 0,
            exhausted: false,
        })
    }

    /// Maximum records per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Records yielded so far
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Read the next chunk, or `None` once the archive is exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOCATED_RECORDS));
        let mut first_line = None;

        while records.len() < self.chunk_size {
            let line = self.lines.next_line().await.map_err(|e| {
                Error::corrupt_archive(format!("after line {}: {e}", self.line_number))
            })?;
            let Some(line) = line else {
                self.exhausted = true;
                break;
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            records.push(parse_record(trimmed, self.line_number)?);
            first_line.get_or_insert(self.line_number);
        }

        if records.is_empty() {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            first_line: first_line.unwrap_or(self.line_number),
            records,
        };
        self.next_index += 1;
        self.records_read += chunk.len();
        Ok(Some(chunk))
    }

    /// Consume the reader as a stream of chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Chunk>> + Send {
        stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_chunk().await?.map(|chunk| (chunk, reader)))
        })
    }
}

/// Parse one line into a record
fn parse_record(line: &str, line_number: usize) -> Result<Record> {
    match serde_json::from_str::<JsonValue>(line) {
        Ok(JsonValue::Object(record)) => Ok(record),
        Ok(other) => Err(Error::malformed_record(
            line_number,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
        Err(e) => Err(Error::malformed_record(line_number, e.to_string())),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
