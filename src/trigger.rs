//! Object-created notifications
//!
//! Turns storage notification documents into the archive file names to run:
//!
//! ```json
//! {"Records": [{"eventName": "ObjectCreated:Put",
//!               "s3": {"bucket": {"name": "activity"},
//!                      "object": {"key": "landing/ghactivity/2024-03-15-9.json.gz"}}}]}
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Notification document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

/// One notification entry
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded object key
    pub key: String,
}

/// An archive that landed and should be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedArchive {
    pub bucket: String,
    /// Decoded object key
    pub key: String,
    /// Key relative to the landing directory
    pub file_name: String,
}

/// Decode a URL-encoded object key (`+` is a space)
pub fn decode_key(key: &str) -> String {
    url::form_urlencoded::parse(key.as_bytes())
        .next()
        .map(|(name, value)| {
            if value.is_empty() {
                name.into_owned()
            } else {
                format!("{name}={value}")
            }
        })
        .unwrap_or_default()
}

/// Parse a notification document
pub fn parse_notification(body: &[u8]) -> Result<Notification> {
    serde_json::from_slice(body)
        .map_err(|e| Error::config(format!("Invalid notification document: {e}")))
}

/// Archives announced by `notification` that landed directly in `landing_dir`
///
/// Entries for other events, other prefixes or nested keys are skipped.
pub fn landed_archives(notification: &Notification, landing_dir: &str) -> Vec<LandedArchive> {
    let landing_dir = landing_dir.trim_matches('/');
    notification
        .records
        .iter()
        .filter_map(|record| {
            if let Some(event) = &record.event_name {
                if !event.starts_with("ObjectCreated") {
                    debug!(event = %event, "Skipping non-create notification");
                    return None;
                }
            }

            let key = decode_key(&record.s3.object.key);
            let file_name = if landing_dir.is_empty() {
                key.as_str()
            } else {
                key.strip_prefix(landing_dir)?.strip_prefix('/')?
            };
            if file_name.is_empty() || file_name.contains('/') {
                debug!(key = %key, "Skipping key outside the landing directory");
                return None;
            }

            Some(LandedArchive {
                bucket: record.s3.bucket.name.clone(),
                file_name: file_name.to_string(),
                key: key.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn notification(entries: &[(&str, &str)]) -> Vec<u8> {
        let records: Vec<_> = entries
            .iter()
            .map(|(event, key)| {
                json!({
                    "eventName": event,
                    "s3": {"bucket": {"name": "activity"}, "object": {"key": key}}
                })
            })
            .collect();
        serde_json::to_vec(&json!({ "Records": records })).unwrap()
    }

    #[test]
    fn test_landed_archive() {
        let body = notification(&[("ObjectCreated:Put", "landing/ghactivity/2024-03-15-9.json.gz")]);
        let parsed = parse_notification(&body).unwrap();
        assert_eq!(
            landed_archives(&parsed, "landing/ghactivity/"),
            vec![LandedArchive {
                bucket: "activity".to_string(),
                key: "landing/ghactivity/2024-03-15-9.json.gz".to_string(),
                file_name: "2024-03-15-9.json.gz".to_string(),
            }]
        );
    }

    #[test]
    fn test_filters_other_prefixes_and_events() {
        let body = notification(&[
            ("ObjectCreated:Put", "raw/ghactivity/x.parquet"),
            ("ObjectRemoved:Delete", "landing/ghactivity/2024-03-15-8.json.gz"),
            ("ObjectCreated:Put", "landing/ghactivity/"),
            ("ObjectCreated:Put", "landing/ghactivity/nested/2024-03-15-7.json.gz"),
            ("ObjectCreated:CompleteMultipartUpload", "landing/ghactivity/2024-03-15-9.json.gz"),
        ]);
        let archives = landed_archives(&parse_notification(&body).unwrap(), "landing/ghactivity");
        let names: Vec<_> = archives.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["2024-03-15-9.json.gz"]);
    }

    #[test]
    fn test_keys_are_url_decoded() {
        assert_eq!(decode_key("landing/ghactivity/my+file%3A1.json.gz"), "landing/ghactivity/my file:1.json.gz");
        assert_eq!(decode_key("a%3Db"), "a=b");
        assert_eq!(decode_key(""), "");
    }

    #[test]
    fn test_missing_event_name_is_accepted() {
        let body = br#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"landing/ghactivity/2024-03-15-9.json.gz"}}}]}"#;
        let parsed = parse_notification(body).unwrap();
        assert_eq!(landed_archives(&parsed, "landing/ghactivity").len(), 1);
    }

    #[test]
    fn test_empty_and_invalid_documents() {
        assert!(landed_archives(&parse_notification(b"{}").unwrap(), "landing").is_empty());
        assert!(matches!(
            parse_notification(b"not json").unwrap_err(),
            Error::Config { .. }
        ));
    }
}
