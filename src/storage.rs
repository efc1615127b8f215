//! Object storage access (S3, GCS, Azure, local filesystem, in-memory)
//!
//! Every read and write the pipeline performs goes through a
//! [`StorageLocation`], which pairs an `object_store` backend with a key
//! prefix and an optional per-call timeout.

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutOptions, UpdateVersion};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A bucket (or directory) plus the backend used to reach it
#[derive(Debug, Clone)]
pub struct StorageLocation {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// URI of the location root, used to render object URIs
    root_uri: String,
    /// Original URL scheme for logging
    scheme: String,
    /// Upper bound on every storage call
    io_timeout: Option<Duration>,
}

impl StorageLocation {
    /// Parse a location URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `memory://` - process-local store
    /// - `/local/path/`, `./path/` or `file:///path` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url)
        } else if url.starts_with("gs://") {
            Self::parse_gcs(url)
        } else if url.starts_with("az://") {
            Self::parse_azure(url)
        } else if url.starts_with("memory://") {
            Ok(Self::from_store(Arc::new(InMemory::new()), "memory://"))
        } else {
            Self::parse_local(url)
        }
    }

    /// Whether `url` names a local directory rather than a bucket
    ///
    /// Local directories cannot replace an object conditionally, so they
    /// cannot hold compare-and-set state.
    pub fn is_local_url(url: &str) -> bool {
        url.starts_with("file://") || !url.contains("://")
    }

    /// Wrap an existing store; `root_uri` is only used to render URIs
    pub fn from_store(store: Arc<dyn ObjectStore>, root_uri: impl Into<String>) -> Self {
        let root_uri = root_uri.into();
        let scheme = root_uri
            .split_once("://")
            .map_or("file", |(scheme, _)| scheme)
            .to_string();
        Self {
            store,
            prefix: String::new(),
            root_uri,
            scheme,
            io_timeout: None,
        }
    }

    /// Bound every storage call by `limit`
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.io_timeout = Some(limit);
        self
    }

    fn split_bucket<'a>(url: &'a str, scheme: &str) -> Result<(&'a str, String)> {
        let without_scheme = url
            .strip_prefix(&format!("{scheme}://"))
            .ok_or_else(|| Error::config(format!("Invalid {scheme} URL: {url}")))?;

        let (bucket, prefix) = match without_scheme.find('/') {
            Some(idx) => (
                &without_scheme[..idx],
                without_scheme[idx + 1..].trim_end_matches('/').to_string(),
            ),
            None => (without_scheme, String::new()),
        };
        if bucket.is_empty() {
            return Err(Error::config(format!("Missing bucket in URL: {url}")));
        }
        Ok((bucket, prefix))
    }

    fn cloud(store: Arc<dyn ObjectStore>, scheme: &str, bucket: &str, prefix: String) -> Self {
        let root_uri = if prefix.is_empty() {
            format!("{scheme}://{bucket}")
        } else {
            format!("{scheme}://{bucket}/{prefix}")
        };
        Self {
            store,
            prefix,
            root_uri,
            scheme: scheme.to_string(),
            io_timeout: None,
        }
    }

    /// Parse S3 URL
    fn parse_s3(url: &str) -> Result<Self> {
        let (bucket, prefix) = Self::split_bucket(url, "s3")?;
        let store = s3_builder(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;
        Ok(Self::cloud(Arc::new(store), "s3", bucket, prefix))
    }

    /// Parse GCS URL
    fn parse_gcs(url: &str) -> Result<Self> {
        let (bucket, prefix) = Self::split_bucket(url, "gs")?;
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;
        Ok(Self::cloud(Arc::new(store), "gs", bucket, prefix))
    }

    /// Parse Azure Blob URL
    fn parse_azure(url: &str) -> Result<Self> {
        let (container, prefix) = Self::split_bucket(url, "az")?;
        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;
        Ok(Self::cloud(Arc::new(store), "az", container, prefix))
    }

    /// Parse local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        if path.is_empty() {
            return Err(Error::config("Empty storage location"));
        }

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;
        let absolute = std::fs::canonicalize(path)
            .map_err(|e| Error::config(format!("Failed to resolve directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(&absolute)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self::from_store(
            Arc::new(store),
            format!("file://{}", absolute.display()),
        ))
    }

    /// Check if this is a cloud location (not local or in-memory)
    pub fn is_cloud(&self) -> bool {
        !matches!(self.scheme.as_str(), "file" | "memory")
    }

    /// Get the scheme (s3, gs, az, file, memory)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Full object path for a key relative to this location
    pub fn object_path(&self, relative: &str) -> ObjectPath {
        let relative = relative.trim_start_matches('/');
        if self.prefix.is_empty() {
            ObjectPath::from(relative)
        } else {
            ObjectPath::from(format!("{}/{relative}", self.prefix))
        }
    }

    /// URI for a key relative to this location, e.g. `s3://bucket/raw/x.parquet`
    pub fn uri(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.root_uri.ends_with("://") {
            format!("{}{relative}", self.root_uri)
        } else {
            format!("{}/{relative}", self.root_uri.trim_end_matches('/'))
        }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::timeout(operation, limit))?,
            None => fut.await,
        }
    }

    /// Read a whole object
    pub async fn get(&self, relative: &str) -> Result<Bytes> {
        let path = self.object_path(relative);
        self.bounded(&format!("get {path}"), async {
            let result = self
                .store
                .get(&path)
                .await
                .map_err(|e| Error::from_store(path.as_ref(), e))?;
            result
                .bytes()
                .await
                .map_err(|e| Error::from_store(path.as_ref(), e))
        })
        .await
    }

    /// Read a whole object along with the version needed for a conditional update
    pub async fn get_versioned(&self, relative: &str) -> Result<Option<(Bytes, UpdateVersion)>> {
        let path = self.object_path(relative);
        self.bounded(&format!("get {path}"), async {
            let result = match self.store.get(&path).await {
                Ok(result) => result,
                Err(object_store::Error::NotFound { .. }) => return Ok(None),
                Err(e) => return Err(Error::from_store(path.as_ref(), e)),
            };
            let version = UpdateVersion {
                e_tag: result.meta.e_tag.clone(),
                version: result.meta.version.clone(),
            };
            let data = result
                .bytes()
                .await
                .map_err(|e| Error::from_store(path.as_ref(), e))?;
            Ok(Some((data, version)))
        })
        .await
    }

    /// Write bytes, replacing any existing object; returns the object URI
    pub async fn put(&self, relative: &str, data: Bytes) -> Result<String> {
        self.put_opts(relative, data, PutOptions::default()).await?;
        Ok(self.uri(relative))
    }

    /// Write bytes with explicit put options (conditional create/update)
    ///
    /// Precondition failures surface as `Error::Storage` carrying the
    /// original `object_store` error so callers can retry.
    pub async fn put_opts(&self, relative: &str, data: Bytes, opts: PutOptions) -> Result<()> {
        let path = self.object_path(relative);
        self.bounded(&format!("put {path}"), async {
            self.store
                .put_opts(&path, data.into(), opts)
                .await
                .map(|_| ())
                .map_err(|e| Error::from_store(path.as_ref(), e))
        })
        .await
    }

    /// List keys under a relative prefix; returned keys are relative to this location
    pub async fn list(&self, relative_prefix: &str) -> Result<Vec<String>> {
        let prefix = self.object_path(relative_prefix);
        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };
        self.bounded(&format!("list {prefix}"), async {
            let metas: Vec<_> = self
                .store
                .list(Some(&prefix))
                .try_collect()
                .await
                .map_err(|e| Error::from_store(prefix.as_ref(), e))?;
            let mut keys: Vec<String> = metas
                .into_iter()
                .map(|meta| {
                    let full = meta.location.to_string();
                    full.strip_prefix(&strip).map_or(full.clone(), ToString::to_string)
                })
                .collect();
            keys.sort();
            Ok(keys)
        })
        .await
    }
}

/// S3 client settings for `bucket`
///
/// AWS_ENDPOINT, AWS_REGION and credentials are read from the environment.
/// Conditional puts use ETag matching so bookmark updates can compare-and-set.
fn s3_builder(bucket: &str) -> AmazonS3Builder {
    AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_conditional_put(S3ConditionalPut::ETagMatch)
}
