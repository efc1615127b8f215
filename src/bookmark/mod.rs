//! Job bookmarks and run audit
//!
//! A bookmark records the latest archive a job processed to completion. It
//! only ever moves forward in archive order. Every run, successful or not,
//! appends a [`JobRunRecord`].
//!
//! # Overview
//!
//! This module provides:
//! - `BookmarkStore` - the async store interface
//! - `MemoryBookmarkStore` - process-local store
//! - `FileBookmarkStore` - a JSON document on disk
//! - `ObjectStoreBookmarkStore` - compare-and-set documents in object storage

mod file;
mod memory;
mod object;
mod store;
mod types;

pub use file::FileBookmarkStore;
pub use memory::MemoryBookmarkStore;
pub use object::{ObjectStoreBookmarkStore, DEFAULT_MAX_ATTEMPTS};
pub use store::BookmarkStore;
pub use types::{BookmarkAdvance, BookmarkDocument, JobBookmark, JobRunRecord};

use crate::config::BookmarkBackend;
use crate::error::Result;
use crate::storage::StorageLocation;
use std::sync::Arc;

/// Open the configured store
///
/// `data` is the pipeline's own location, used by the object-store backend
/// when no separate URL is configured.
pub fn open_store(
    backend: &BookmarkBackend,
    data: &StorageLocation,
) -> Result<Arc<dyn BookmarkStore>> {
    let store: Arc<dyn BookmarkStore> = match backend {
        BookmarkBackend::Memory => Arc::new(MemoryBookmarkStore::new()),
        BookmarkBackend::File { path } => Arc::new(FileBookmarkStore::open(path)?),
        BookmarkBackend::ObjectStore { url: None } => {
            Arc::new(ObjectStoreBookmarkStore::new(data.clone()))
        }
        BookmarkBackend::ObjectStore { url: Some(url) } => {
            Arc::new(ObjectStoreBookmarkStore::new(StorageLocation::parse(url)?))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests;
