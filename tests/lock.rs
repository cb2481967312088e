//! Exclusive lock behavior over the in-memory and directory stores

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};

use world_sync::config::LOCK_KEY;
use world_sync::error::SyncError;
use world_sync::store::{LocalStore, MemoryStore, ObjectStore};
use world_sync::sync::{ExclusiveLock, LockRecord};
use world_sync::utils::time::FixedClock;

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap())
}

#[tokio::test]
async fn test_conflict_reports_stored_owner() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(
            LOCK_KEY,
            Bytes::from_static(
                br#"{"hostname":"alpha","timestamp":"2024-05-31T22:00:00Z","pid":4242}"#,
            ),
            Some("application/json"),
        )
        .await
        .unwrap();

    let lock = ExclusiveLock::new(store.clone(), true);
    match lock.acquire("beta", 1, &clock()).await {
        Err(SyncError::LockConflict(existing)) => {
            assert_eq!(
                existing,
                LockRecord {
                    hostname: "alpha".into(),
                    timestamp: "2024-05-31T22:00:00Z".into(),
                    pid: 4242,
                }
            );
            let message = SyncError::LockConflict(existing).to_string();
            assert!(message.contains("alpha"));
            assert!(message.contains("2024-05-31T22:00:00Z"));
        }
        other => panic!("expected lock conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conflict_with_foreign_pid_values_keeps_owner() {
    for body in [
        &br#"{"hostname":"alpha","timestamp":"2024-01-01T00:00:00","pid":-5}"#[..],
        &br#"{"hostname":"alpha","timestamp":"2024-01-01T00:00:00","pid":null}"#[..],
    ] {
        let store = Arc::new(MemoryStore::new());
        store
            .put(LOCK_KEY, Bytes::copy_from_slice(body), None)
            .await
            .unwrap();

        let lock = ExclusiveLock::new(store.clone(), true);
        match lock.acquire("beta", 1, &clock()).await {
            Err(SyncError::LockConflict(existing)) => {
                assert_eq!(existing.hostname, "alpha");
                assert_eq!(existing.timestamp, "2024-01-01T00:00:00");
            }
            other => panic!("expected lock conflict, got {other:?}"),
        }
        assert_eq!(store.get(LOCK_KEY).await.unwrap(), Bytes::copy_from_slice(body));
    }
}

#[tokio::test]
async fn test_stored_record_is_pretty_json_with_expected_keys() {
    let store = Arc::new(MemoryStore::new());
    let lock = ExclusiveLock::new(store.clone(), true);
    lock.acquire("alpha", 77, &clock()).await.unwrap();

    let body = store.get(LOCK_KEY).await.unwrap();
    let text = std::str::from_utf8(&body).unwrap();
    assert!(text.contains('\n'), "record should be pretty-printed: {text}");

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["hostname"], "alpha");
    assert_eq!(value["timestamp"], "2024-06-01T09:30:00Z");
    assert_eq!(value["pid"], 77);
}

#[tokio::test]
async fn test_acquire_release_acquire_on_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(dir.path()));
    let lock = ExclusiveLock::new(store, true);

    lock.acquire("alpha", 1, &clock()).await.unwrap();
    assert!(dir.path().join(LOCK_KEY).exists());
    assert!(matches!(
        lock.acquire("beta", 2, &clock()).await,
        Err(SyncError::LockConflict(_))
    ));

    lock.release().await;
    assert_eq!(lock.check().await.unwrap(), None);
    let record = lock.acquire("beta", 2, &clock()).await.unwrap();
    assert_eq!(record.hostname, "beta");
}

#[tokio::test]
async fn test_release_without_lock_is_ok() {
    let store = Arc::new(MemoryStore::new());
    let lock = ExclusiveLock::new(store.clone(), false);
    lock.release().await;
    assert!(store.keys().is_empty());
}
