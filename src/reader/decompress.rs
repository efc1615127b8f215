//! Streaming (de)compression of archive payloads

use crate::archive::ArchiveCompression;
use crate::error::Result;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use async_compression::tokio::write::{GzipEncoder, ZstdEncoder};
use bytes::Bytes;
use std::io::Cursor;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Decompressed byte stream over an archive payload
pub type ArchiveReader = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap a payload with the decoder for `compression`
///
/// Concatenated gzip/zstd members are decoded as one stream. Decoding is
/// lazy: corruption surfaces as an I/O error while reading.
pub fn decompress(payload: Bytes, compression: ArchiveCompression) -> ArchiveReader {
    let source = Cursor::new(payload);
    match compression {
        ArchiveCompression::None => Box::pin(source),
        ArchiveCompression::Gzip => {
            let mut decoder = GzipDecoder::new(source);
            decoder.multiple_members(true);
            Box::pin(decoder)
        }
        ArchiveCompression::Zstd => {
            let mut decoder = ZstdDecoder::new(source);
            decoder.multiple_members(true);
            Box::pin(decoder)
        }
    }
}

/// Compress `data` the way landing archives are compressed
pub async fn compress(data: &[u8], compression: ArchiveCompression) -> Result<Bytes> {
    match compression {
        ArchiveCompression::None => Ok(Bytes::copy_from_slice(data)),
        ArchiveCompression::Gzip => {
            let mut encoder = GzipEncoder::new(Vec::new());
            encoder.write_all(data).await?;
            encoder.shutdown().await?;
            Ok(Bytes::from(encoder.into_inner()))
        }
        ArchiveCompression::Zstd => {
            let mut encoder = ZstdEncoder::new(Vec::new());
            encoder.write_all(data).await?;
            encoder.shutdown().await?;
            Ok(Bytes::from(encoder.into_inner()))
        }
    }
}
