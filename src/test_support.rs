//! Shared test fixtures

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOpts, PutOptions, PutPayload, PutResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How puts under the faulty prefix misbehave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutFault {
    /// Return a generic store error
    Fail,
    /// Never complete
    Hang,
    /// Report a failed precondition
    Conflict,
}

/// In-memory store whose puts under one prefix misbehave
///
/// Reads and everything outside the prefix are served by a plain
/// [`InMemory`] store.
#[derive(Debug)]
pub struct FaultyStore {
    inner: InMemory,
    prefix: String,
    fault: PutFault,
    /// Number of puts the fault applies to, all of them when `None`
    limit: Option<usize>,
    puts: AtomicUsize,
}

impl FaultyStore {
    pub fn new(prefix: &str, fault: PutFault) -> Self {
        Self {
            inner: InMemory::new(),
            prefix: prefix.to_string(),
            fault,
            limit: None,
            puts: AtomicUsize::new(0),
        }
    }

    /// Only misbehave on the first `count` puts under the prefix
    pub fn times(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    /// Puts attempted under the prefix
    pub fn faulty_puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Display for FaultyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FaultyStore({:?} under {})", self.fault, self.prefix)
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        if !location.as_ref().starts_with(&self.prefix) {
            return self.inner.put_opts(location, payload, opts).await;
        }
        let seen = self.puts.fetch_add(1, Ordering::SeqCst);
        if self.limit.is_some_and(|limit| seen >= limit) {
            return self.inner.put_opts(location, payload, opts).await;
        }
        match self.fault {
            PutFault::Fail => Err(object_store::Error::Generic {
                store: "faulty",
                source: format!("refusing to write {location}").into(),
            }),
            PutFault::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.inner.put_opts(location, payload, opts).await
            }
            PutFault::Conflict => Err(object_store::Error::Precondition {
                path: location.to_string(),
                source: "version changed".into(),
            }),
        }
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
