//! Error types for the transform pipeline
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The main error type for the transform pipeline
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Access denied: {path}")]
    AccessDenied { path: String },

    #[error("Invalid archive key '{key}': {message}")]
    InvalidKeyFormat { key: String, message: String },

    #[error("Corrupt archive: {message}")]
    CorruptArchive { message: String },

    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    // ============================================================================
    // Transform / Output Errors
    // ============================================================================
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Failed to write {path}: {message}")]
    WriteFailure { path: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // ============================================================================
    // Bookmark Errors
    // ============================================================================
    #[error("Bookmark for job '{job_id}' changed concurrently ({attempts} attempts)")]
    BookmarkConflict { job_id: String, attempts: u32 },

    #[error("Bookmark store error: {message}")]
    Bookmark { message: String },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Library Errors
    // ============================================================================
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], reported in run results and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    InvalidKeyFormat,
    CorruptArchive,
    MalformedRecord,
    Encoding,
    WriteFailure,
    Timeout,
    BookmarkConflict,
    Config,
    Internal,
}

impl ErrorKind {
    /// Status code reported to the invoker for a run that failed with this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidKeyFormat | ErrorKind::Config => 400,
            ErrorKind::AccessDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::BookmarkConflict => 409,
            ErrorKind::CorruptArchive | ErrorKind::MalformedRecord | ErrorKind::Encoding => 422,
            ErrorKind::Timeout => 504,
            ErrorKind::WriteFailure | ErrorKind::Internal => 500,
        }
    }
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt archive error
    pub fn corrupt_archive(message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            message: message.into(),
        }
    }

    /// Create a malformed record error
    pub fn malformed_record(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: message.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a write failure
    pub fn write_failure(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: limit.as_millis() as u64,
        }
    }

    /// Create a bookmark store error
    pub fn bookmark(message: impl Into<String>) -> Self {
        Self::Bookmark {
            message: message.into(),
        }
    }

    /// Map an object store error for `path`, lifting not-found and permission
    /// failures into their own variants
    pub fn from_store(path: impl Into<String>, err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound { path: path.into() },
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => Self::AccessDenied { path: path.into() },
            other => Self::Storage(other),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AccessDenied { .. } => ErrorKind::AccessDenied,
            Error::InvalidKeyFormat { .. } => ErrorKind::InvalidKeyFormat,
            Error::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            Error::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Error::Encoding { .. } | Error::Arrow(_) | Error::Parquet(_) => ErrorKind::Encoding,
            Error::WriteFailure { .. } => ErrorKind::WriteFailure,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::BookmarkConflict { .. } => ErrorKind::BookmarkConflict,
            Error::Config { .. } | Error::YamlParse(_) => ErrorKind::Config,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if re-driving the same archive may succeed without remediation
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::WriteFailure { .. } | Error::BookmarkConflict { .. } => {
                true
            }
            Error::Storage(err) => !matches!(
                err,
                object_store::Error::InvalidPath { .. }
                    | object_store::Error::NotSupported { .. }
                    | object_store::Error::NotImplemented
            ),
            _ => false,
        }
    }
}

/// Result type alias for the transform pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::invalid_key("malformed.gz", "expected 4 segments");
        assert_eq!(
            err.to_string(),
            "Invalid archive key 'malformed.gz': expected 4 segments"
        );

        let err = Error::timeout("fetch", Duration::from_secs(2));
        assert_eq!(err.to_string(), "fetch timed out after 2000ms");
    }

    #[test]
    fn test_kind_and_status() {
        assert_eq!(
            Error::invalid_key("x", "y").kind().status_code(),
            400
        );
        assert_eq!(
            Error::NotFound {
                path: "a".to_string()
            }
            .kind()
            .status_code(),
            404
        );
        assert_eq!(Error::corrupt_archive("bad").kind(), ErrorKind::CorruptArchive);
        assert_eq!(Error::encoding("bad").kind().status_code(), 422);
        assert_eq!(Error::Other("x".to_string()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_from_store_maps_not_found() {
        let err = object_store::Error::NotFound {
            path: "landing/x".to_string(),
            source: "missing".into(),
        };
        let mapped = Error::from_store("landing/x", err);
        assert!(matches!(mapped, Error::NotFound { ref path } if path == "landing/x"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout("put", Duration::from_millis(10)).is_retryable());
        assert!(Error::write_failure("p", "boom").is_retryable());
        assert!(!Error::corrupt_archive("bad").is_retryable());
        assert!(!Error::invalid_key("k", "m").is_retryable());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
