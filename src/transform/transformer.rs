//! Per-archive chunk transformer

use super::parquet::{encode_batch, ParquetWriterConfig};
use super::schema::{records_to_batch, ArchiveSchema};
use crate::error::{Error, Result};
use crate::reader::Chunk;
use crate::types::Record;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;

/// A chunk encoded as a complete Parquet file
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Position of the source chunk within the archive
    pub index: usize,
    /// Number of records encoded
    pub records: usize,
    /// Number of columns encoded
    pub columns: usize,
    /// Parquet bytes
    pub data: Bytes,
}

/// Remove `fields` from a record; absent fields are ignored
pub fn drop_fields(record: &mut Record, fields: &[String]) {
    for field in fields {
        record.remove(field);
    }
}

/// Transforms the chunks of one archive
///
/// Holds the archive's column types so that later chunks are encoded
/// consistently with earlier ones. Use a fresh transformer per archive.
///
/// Feeding every chunk to [`observe`](Self::observe) and then calling
/// [`fix_schema`](Self::fix_schema) before the first `transform` gives all
/// output objects of the archive the same columns and types.
#[derive(Debug, Clone)]
pub struct ChunkTransformer {
    drop_fields: Vec<String>,
    parquet: ParquetWriterConfig,
    schema: ArchiveSchema,
}

impl ChunkTransformer {
    /// Create a transformer dropping `drop_fields` from every record
    pub fn new(drop_fields: Vec<String>, parquet: ParquetWriterConfig) -> Self {
        Self {
            drop_fields,
            parquet,
            schema: ArchiveSchema::new(),
        }
    }

    /// Column types accumulated so far
    pub fn schema(&self) -> &ArchiveSchema {
        &self.schema
    }

    /// Fold a chunk's projected column types into the archive schema
    pub fn observe(&mut self, chunk: Chunk) -> Result<()> {
        let index = chunk.index;
        let records = self.project(chunk.records);
        self.schema.observe(&records).map_err(|e| in_chunk(index, e))
    }

    /// Encode every later chunk with the columns observed so far
    pub fn fix_schema(&mut self) {
        self.schema.fix();
    }

    /// Project a chunk and convert it to Arrow
    pub fn to_batch(&mut self, chunk: Chunk) -> Result<RecordBatch> {
        let index = chunk.index;
        let records = self.project(chunk.records);

        let schema = self
            .schema
            .absorb(&records)
            .map_err(|e| in_chunk(index, e))?;
        if schema.fields().is_empty() {
            return Err(Error::encoding(format!(
                "chunk {index} has no columns left to encode"
            )));
        }
        records_to_batch(&records, schema)
    }

    fn project(&self, mut records: Vec<Record>) -> Vec<Record> {
        for record in &mut records {
            drop_fields(record, &self.drop_fields);
        }
        records
    }

    /// Project a chunk and encode it as Parquet
    pub fn transform(&mut self, chunk: Chunk) -> Result<EncodedChunk> {
        let index = chunk.index;
        let batch = self.to_batch(chunk)?;
        let data = encode_batch(&batch, &self.parquet)?;
        Ok(EncodedChunk {
            index,
            records: batch.num_rows(),
            columns: batch.num_columns(),
            data,
        })
    }
}

fn in_chunk(index: usize, error: Error) -> Error {
    match error {
        Error::Encoding { message } => Error::encoding(format!("chunk {index}: {message}")),
        other => other,
    }
}
