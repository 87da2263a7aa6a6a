use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;

use snapvault_api::{FetchFuture, Fetcher, SnapshotError};
use snapvault_engine::{CycleOutcome, SchedulerConfig, SchedulerEvent, Snapshotter};
use snapvault_store::{FileStore, StoreEvent};

/// A board whose card count grows on every fetch; every third fetch fails.
struct FlakyBoard {
    calls: AtomicUsize,
}

impl Fetcher for FlakyBoard {
    fn fetch(&self) -> FetchFuture<'_> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            if n % 3 == 0 {
                return Err(SnapshotError::fetch(format!("HTTP 503 on call {n}")));
            }
            Ok(json!({ "name": "roadmap", "cards": n }))
        })
    }
}

fn start_of_day() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 11, 20)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap()
}

fn minute_clock() -> impl Fn() -> NaiveDateTime + Send + Sync + 'static {
    let minutes = AtomicI64::new(0);
    move || start_of_day() + chrono::Duration::minutes(minutes.fetch_add(1, Ordering::SeqCst))
}

#[tokio::test]
async fn failed_cycles_leave_no_files_and_no_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path().join("boards")));
    let board = Arc::new(FlakyBoard { calls: AtomicUsize::new(0) });
    let snap = Snapshotter::with_clock(Arc::clone(&store), board, minute_clock());

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(snap.capture().await);
    }

    assert_eq!(
        outcomes,
        vec![
            CycleOutcome::Captured { count: 1, persisted: true },
            CycleOutcome::Captured { count: 2, persisted: true },
            CycleOutcome::Failed { count: 3 },
            CycleOutcome::Captured { count: 3, persisted: true },
            CycleOutcome::Captured { count: 4, persisted: true },
        ]
    );

    let stored = store.read_all().await.unwrap();
    assert_eq!(stored.len(), 4);

    // Minute 2 belongs to the failed cycle.
    let gap = start_of_day() + chrono::Duration::minutes(2);
    assert!(store.read(gap, None).await.unwrap().is_empty());

    let last_two = store.read_last(2).await.unwrap();
    assert_eq!(last_two[0].payload, json!({ "name": "roadmap", "cards": 4 }));
    assert_eq!(last_two[1].payload, json!({ "name": "roadmap", "cards": 5 }));
}

#[tokio::test]
async fn scheduled_run_writes_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let board = Arc::new(FlakyBoard { calls: AtomicUsize::new(0) });

    let config = SchedulerConfig {
        cadence_ms: 10,
        persist_every: 2,
        ..SchedulerConfig::default()
    };
    let snap = Snapshotter::from_config(&config, Arc::clone(&store), board).unwrap();

    let mut writes = store.subscribe();
    let mut events = snap.subscribe();
    snap.start();

    // Cycles 2 and 4 are persisted.
    let mut written = Vec::new();
    while written.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), writes.recv())
            .await
            .expect("timed out waiting for a write")
            .unwrap();
        let StoreEvent::WriteCompleted { payload, .. } = event;
        written.push(payload);
    }
    let mut persisted_counts = Vec::new();
    while !persisted_counts.contains(&4) {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a snapshot")
            .unwrap();
        if let SchedulerEvent::Snapshot { count, .. } = event {
            if count % 2 == 0 {
                persisted_counts.push(count);
            }
        }
    }
    snap.stop();

    assert!(persisted_counts.starts_with(&[2]), "{persisted_counts:?}");
    assert_eq!(written.len(), 2);

    let latest = store.read_latest().await.unwrap().unwrap();
    assert_eq!(latest.payload["name"], "roadmap");
}
