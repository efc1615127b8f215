//! Tests for the bookmark stores

use super::*;
use crate::error::{Error, ErrorKind};
use crate::pipeline::Stage;
use crate::test_support::{FaultyStore, PutFault};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use test_case::test_case;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Memory,
    File,
    Object,
}

fn make(kind: Kind) -> (Arc<dyn BookmarkStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn BookmarkStore> = match kind {
        Kind::Memory => Arc::new(MemoryBookmarkStore::new()),
        Kind::File => Arc::new(FileBookmarkStore::open(dir.path().join("bookmarks.json")).unwrap()),
        Kind::Object => Arc::new(ObjectStoreBookmarkStore::new(
            StorageLocation::parse("memory://").unwrap(),
        )),
    };
    (store, dir)
}

fn run(job_id: &str, offset_ms: i64, status_code: u16) -> JobRunRecord {
    let base = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
    JobRunRecord {
        job_id: job_id.to_string(),
        run_timestamp: base + ChronoDuration::milliseconds(offset_ms),
        status_code,
        source_file: "2024-03-15-9.json.gz".to_string(),
        target_pattern: None,
        stage: None,
        error_kind: None,
        error_detail: None,
        records: 0,
        objects_written: 0,
    }
}

// ============================================================================
// Bookmark Type Tests
// ============================================================================

#[test]
fn test_apply_advance_is_monotonic() {
    let mut job = JobBookmark::new("job", json!(null));
    assert_eq!(
        job.apply_advance("2024-03-15-9.json.gz"),
        BookmarkAdvance::Advanced { previous: None }
    );
    assert_eq!(job.revision, 1);

    // Hour 10 sorts after hour 9 even though "10" < "9" as strings
    assert!(job.apply_advance("2024-03-15-10.json.gz").is_advanced());
    assert_eq!(
        job.apply_advance("2024-03-15-9.json.gz"),
        BookmarkAdvance::Unchanged {
            current: "2024-03-15-10.json.gz".to_string()
        }
    );
    assert_eq!(
        job.last_processed_file.as_deref(),
        Some("2024-03-15-10.json.gz")
    );
    assert_eq!(job.revision, 2);
}

#[test]
fn test_reprocessing_same_archive_is_unchanged() {
    let mut job = JobBookmark::new("job", json!(null));
    job.apply_advance("2024-03-15-9.json.gz");
    assert!(!job.apply_advance("2024-03-15-9.json.gz").is_advanced());
}

#[test]
fn test_run_record_serialization_skips_empty_failure() {
    let value = serde_json::to_value(run("job", 0, 200)).unwrap();
    assert!(value.get("error_kind").is_none());
    assert!(value.get("stage").is_none());

    let mut failed = run("job", 0, 422);
    failed.stage = Some(Stage::Reading);
    failed.error_kind = Some(ErrorKind::CorruptArchive);
    let value = serde_json::to_value(&failed).unwrap();
    assert_eq!(value["stage"], "reading");
    assert_eq!(value["error_kind"], "corrupt_archive");
    assert!(!failed.is_success());
}

#[test]
fn test_document_keeps_runs_ordered() {
    let mut document = BookmarkDocument::new();
    assert!(document.push_run(&run("job", 20, 200)));
    assert!(document.push_run(&run("job", 10, 200)));
    assert!(!document.push_run(&run("job", 10, 500)));
    let offsets: Vec<_> = document
        .runs("job")
        .iter()
        .map(|r| r.run_timestamp.timestamp_subsec_millis())
        .collect();
    assert_eq!(offsets, vec![10, 20]);
}

// ============================================================================
// Store Contract Tests
// ============================================================================

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::File ; "file")]
#[test_case(Kind::Object ; "object")]
#[tokio::test]
async fn test_unknown_job_is_not_found(kind: Kind) {
    let (store, _dir) = make(kind);
    let err = store.get_bookmark("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::File ; "file")]
#[test_case(Kind::Object ; "object")]
#[tokio::test]
async fn test_register_keeps_bookmark(kind: Kind) {
    let (store, _dir) = make(kind);
    store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    let job = store
        .register_job("job", json!({"source": "ghactivity"}))
        .await
        .unwrap();
    assert_eq!(job.config["source"], "ghactivity");
    assert_eq!(
        job.last_processed_file.as_deref(),
        Some("2024-03-15-9.json.gz")
    );
    assert_eq!(store.get_bookmark("job").await.unwrap(), job);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::File ; "file")]
#[test_case(Kind::Object ; "object")]
#[tokio::test]
async fn test_advance_never_regresses(kind: Kind) {
    let (store, _dir) = make(kind);
    let first = store
        .advance_bookmark("job", "2024-03-15-10.json.gz")
        .await
        .unwrap();
    assert_eq!(first, BookmarkAdvance::Advanced { previous: None });

    let stale = store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    assert!(!stale.is_advanced());

    let next = store
        .advance_bookmark("job", "2024-03-16-0.json.gz")
        .await
        .unwrap();
    assert_eq!(
        next,
        BookmarkAdvance::Advanced {
            previous: Some("2024-03-15-10.json.gz".to_string())
        }
    );
    assert_eq!(
        store
            .get_bookmark("job")
            .await
            .unwrap()
            .last_processed_file
            .as_deref(),
        Some("2024-03-16-0.json.gz")
    );
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::File ; "file")]
#[test_case(Kind::Object ; "object")]
#[tokio::test]
async fn test_runs_are_append_only(kind: Kind) {
    let (store, _dir) = make(kind);
    store.record_run(&run("job", 500, 200)).await.unwrap();
    store.record_run(&run("job", 100, 422)).await.unwrap();
    store.record_run(&run("other", 0, 200)).await.unwrap();

    let err = store.record_run(&run("job", 100, 200)).await.unwrap_err();
    assert!(matches!(err, Error::Bookmark { .. }), "{err}");

    let runs = store.list_runs("job").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status_code, 422);
    assert_eq!(runs[1].status_code, 200);
    assert!(store.list_runs("missing").await.unwrap().is_empty());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Object ; "object")]
#[tokio::test]
async fn test_concurrent_advances_keep_latest(kind: Kind) {
    let (store, _dir) = make(kind);
    let mut handles = Vec::new();
    for hour in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .advance_bookmark("job", &format!("2024-03-15-{hour}.json.gz"))
                .await
        }));
    }
    for handle in handles {
        // Every racer either advances or observes a newer bookmark
        handle.await.unwrap().unwrap();
    }
    assert_eq!(
        store
            .get_bookmark("job")
            .await
            .unwrap()
            .last_processed_file
            .as_deref(),
        Some("2024-03-15-7.json.gz")
    );
}

// ============================================================================
// File Store Tests
// ============================================================================

#[tokio::test]
async fn test_file_store_persists_across_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("bookmarks.json");
    {
        let store = FileBookmarkStore::open(&path).unwrap();
        store
            .advance_bookmark("job", "2024-03-15-9.json.gz")
            .await
            .unwrap();
        store.record_run(&run("job", 0, 200)).await.unwrap();
    }
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let reopened = FileBookmarkStore::open(&path).unwrap();
    assert_eq!(reopened.path(), path.as_path());
    assert_eq!(
        reopened
            .get_bookmark("job")
            .await
            .unwrap()
            .last_processed_file
            .as_deref(),
        Some("2024-03-15-9.json.gz")
    );
    assert_eq!(reopened.list_runs("job").await.unwrap().len(), 1);
}

#[test]
fn test_file_store_rejects_corrupt_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bookmarks.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = FileBookmarkStore::open(&path).unwrap_err();
    assert!(matches!(err, Error::Bookmark { .. }));
}

// ============================================================================
// Object Store Tests
// ============================================================================

#[tokio::test]
async fn test_object_store_layout() {
    let location = StorageLocation::parse("memory://").unwrap();
    let store = ObjectStoreBookmarkStore::new(location.clone());
    store
        .advance_bookmark("ghactivity_transform", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    store
        .record_run(&run("ghactivity_transform", 0, 200))
        .await
        .unwrap();

    let keys = location.list("").await.unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], "_job_runs/ghactivity_transform/00001710496800000000.json");
    assert_eq!(keys[1], "_jobs/ghactivity_transform.json");
}

#[tokio::test]
async fn test_exhausted_retries_is_conflict() {
    let faulty = Arc::new(FaultyStore::new("_jobs/", PutFault::Conflict));
    let location = StorageLocation::from_store(faulty.clone(), "memory://");
    let store = ObjectStoreBookmarkStore::new(location).with_max_attempts(3);

    let err = store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::BookmarkConflict { ref job_id, attempts: 3 } if job_id == "job"),
        "{err}"
    );
    assert_eq!(err.kind().status_code(), 409);
    assert_eq!(faulty.faulty_puts(), 3);
}

#[tokio::test]
async fn test_lost_race_is_retried() {
    // The first put loses the race, the second goes through
    let faulty = Arc::new(FaultyStore::new("_jobs/", PutFault::Conflict).times(1));
    let location = StorageLocation::from_store(faulty.clone(), "memory://");
    let store = ObjectStoreBookmarkStore::new(location);

    let outcome = store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    assert!(outcome.is_advanced());
    assert_eq!(faulty.faulty_puts(), 2);
    assert_eq!(store.get_bookmark("job").await.unwrap().revision, 1);
}

#[tokio::test]
async fn test_unchanged_advance_writes_nothing() {
    let faulty = Arc::new(FaultyStore::new("_jobs/", PutFault::Conflict).times(0));
    let location = StorageLocation::from_store(faulty.clone(), "memory://");
    let store = ObjectStoreBookmarkStore::new(location);

    store
        .advance_bookmark("job", "2024-03-15-10.json.gz")
        .await
        .unwrap();
    store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    assert_eq!(faulty.faulty_puts(), 1);
}

// ============================================================================
// Backend Selection Tests
// ============================================================================

#[tokio::test]
async fn test_open_store_uses_data_location_by_default() {
    let data = StorageLocation::parse("memory://").unwrap();
    let store = open_store(&BookmarkBackend::ObjectStore { url: None }, &data).unwrap();
    store
        .advance_bookmark("job", "2024-03-15-9.json.gz")
        .await
        .unwrap();
    assert_eq!(
        data.list("_jobs").await.unwrap(),
        vec!["_jobs/job.json".to_string()]
    );
}

#[test]
fn test_open_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let data = StorageLocation::parse("memory://").unwrap();
    let backend = BookmarkBackend::File {
        path: dir.path().join("b.json"),
    };
    assert!(open_store(&backend, &data).is_ok());
}
