//! Archive fetcher
//!
//! Reads compressed landing archives from `{landing_prefix}/{source}/{file}`.

use crate::archive::ArchiveKey;
use crate::error::Result;
use crate::storage::StorageLocation;
use bytes::Bytes;
use tracing::debug;

/// Retrieves landing archives from object storage
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    location: StorageLocation,
    landing_dir: String,
}

impl ArchiveFetcher {
    /// Create a fetcher reading from `{landing_prefix}/{source}/` of `location`
    pub fn new(location: StorageLocation, landing_prefix: &str, source: &str) -> Self {
        let landing_dir = [landing_prefix, source]
            .iter()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            location,
            landing_dir,
        }
    }

    /// Directory archives land in, relative to the bucket
    pub fn landing_dir(&self) -> &str {
        &self.landing_dir
    }

    /// Relative key of an archive
    pub fn source_path(&self, key: &ArchiveKey) -> String {
        if self.landing_dir.is_empty() {
            key.file_name().to_string()
        } else {
            format!("{}/{}", self.landing_dir, key.file_name())
        }
    }

    /// Fetch the full compressed payload of an archive
    ///
    /// Fails with `NotFound`, `AccessDenied` or `Timeout`; never retries.
    pub async fn fetch(&self, key: &ArchiveKey) -> Result<Bytes> {
        let path = self.source_path(key);
        let payload = self.location.get(&path).await?;
        debug!(path = %path, bytes = payload.len(), "Fetched archive");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_source_path() {
        let location = StorageLocation::parse("memory://").unwrap();
        let fetcher = ArchiveFetcher::new(location, "landing/", "/ghactivity");
        let key = ArchiveKey::parse("2024-03-15-9.json.gz").unwrap();
        assert_eq!(
            fetcher.source_path(&key),
            "landing/ghactivity/2024-03-15-9.json.gz"
        );
    }

    #[tokio::test]
    async fn test_fetch_existing_archive() {
        let location = StorageLocation::parse("memory://").unwrap();
        location
            .put(
                "landing/ghactivity/2024-03-15-9.json.gz",
                Bytes::from_static(b"payload"),
            )
            .await
            .unwrap();

        let fetcher = ArchiveFetcher::new(location, "landing", "ghactivity");
        let key = ArchiveKey::parse("2024-03-15-9.json.gz").unwrap();
        assert_eq!(fetcher.fetch(&key).await.unwrap().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_fetch_missing_archive() {
        let location = StorageLocation::parse("memory://").unwrap();
        let fetcher = ArchiveFetcher::new(location, "landing", "ghactivity");
        let key = ArchiveKey::parse("2024-03-15-9.json.gz").unwrap();

        let err = fetcher.fetch(&key).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref path } if path.ends_with("2024-03-15-9.json.gz")));
    }
}
