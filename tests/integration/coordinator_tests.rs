//! Collection run behavior through the public coordinator API

use crate::common::{
    fast_builder, settings, targets, EchoExtractor, FakeBrowser, TabBoundExtractor,
};
use async_trait::async_trait;
use group_harvest::bus::{CollectionEvent, EventStream};
use group_harvest::collector::{CollectionCoordinator, FixedDelayPolicy, TabOptions};
use group_harvest::logging::LogSink;
use group_harvest::model::{CollectionSettings, LogEntry, LogLevel, RunStatus};
use group_harvest::storage::{KeyValueStore, RunStore, SqliteStore, StorageError, StorageResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Storage that reads as empty and refuses every write
struct FullDiskStore;

#[async_trait]
impl KeyValueStore for FullDiskStore {
    async fn get(&self, _key: &str) -> StorageResult<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> StorageResult<()> {
        Err(StorageError::Database("disk full".to_string()))
    }

    async fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Database("disk full".to_string()))
    }

    async fn clear(&self) -> StorageResult<()> {
        Err(StorageError::Database("disk full".to_string()))
    }
}

fn sqlite_store(dir: &TempDir) -> RunStore {
    let store = SqliteStore::new(&dir.path().join("harvest.db")).unwrap();
    RunStore::new(Arc::new(store))
}

#[tokio::test]
async fn test_full_run_visits_targets_in_order_one_tab_at_a_time() {
    let browser = Arc::new(FakeBrowser::default());
    let events = EventStream::new(128);
    let mut subscription = events.subscribe();
    let coordinator = fast_builder(
        browser.clone(),
        EchoExtractor::default(),
        RunStore::in_memory(),
        events,
    )
    .build();

    let ack = coordinator
        .start(targets(&["alpha", "beta", "gamma", "delta"]), settings())
        .await;
    assert!(ack.accepted);
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    assert_eq!(
        browser.visited(),
        vec![
            "https://example.com/groups/alpha/",
            "https://example.com/groups/beta/",
            "https://example.com/groups/gamma/",
            "https://example.com/groups/delta/",
        ]
    );
    assert_eq!(browser.max_open(), 1);
    assert_eq!(browser.open_now(), 0);
    assert!(!coordinator.has_active_tab());

    // Records carry the id of the target they came from, in queue order
    let ids: Vec<_> = coordinator
        .records()
        .iter()
        .map(|r| r.target_id.clone())
        .collect();
    assert_eq!(ids, vec!["alpha", "beta", "gamma", "delta"]);

    // Progress never goes backwards and ends with a completion event
    let mut indices = Vec::new();
    let mut completed = None;
    while let Some(event) = subscription.try_recv() {
        match event {
            CollectionEvent::Progress { target_index, total, .. } => {
                assert_eq!(total, 4);
                indices.push(target_index);
            }
            CollectionEvent::Completed { records, failed_items } => {
                completed = Some((records.len(), failed_items));
            }
            _ => {}
        }
    }
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(completed, Some((4, 0)));

    let run = coordinator.snapshot();
    assert_eq!(run.percent(), 100);
    assert!(run.finished_at().is_some());
}

#[tokio::test]
async fn test_failed_target_does_not_stop_the_run() {
    let browser = Arc::new(FakeBrowser::default());
    let coordinator = fast_builder(
        browser.clone(),
        EchoExtractor::default(),
        RunStore::in_memory(),
        EventStream::new(64),
    )
    .build();

    coordinator
        .start(targets(&["one", "broken", "three"]), settings())
        .await;
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let run = coordinator.snapshot();
    assert_eq!(run.cursor(), 3);
    assert_eq!(run.records().len(), 2);
    assert_eq!(run.failures().len(), 1);
    assert_eq!(run.failures()[0].target_id, "broken");
    assert!(run.failures()[0].message.contains("No posts found"));

    // The failing tab was still closed
    assert_eq!(browser.open_now(), 0);
}

#[tokio::test]
async fn test_run_completes_when_checkpoints_cannot_be_saved() {
    let browser = Arc::new(FakeBrowser::default());
    let coordinator = fast_builder(
        browser.clone(),
        EchoExtractor::default(),
        RunStore::new(Arc::new(FullDiskStore)),
        EventStream::new(64),
    )
    .build();

    assert!(coordinator.start(targets(&["a", "b", "c"]), settings()).await.accepted);
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let run = coordinator.snapshot();
    assert_eq!(run.cursor(), 3);
    assert_eq!(run.records().len(), 3);
    assert!(run.failures().is_empty());
    assert_eq!(browser.open_now(), 0);
}

#[tokio::test]
async fn test_stop_closes_the_tab_being_extracted() {
    let browser = Arc::new(FakeBrowser::default());
    let extractor = TabBoundExtractor {
        browser: browser.clone(),
        limit: Duration::from_secs(5),
    };
    let coordinator = CollectionCoordinator::builder(
        browser.clone(),
        Arc::new(extractor),
        RunStore::in_memory(),
        EventStream::new(64),
    )
    .rate_limit(FixedDelayPolicy::none())
    .tab_options(TabOptions::immediate())
    .build();

    coordinator.start(targets(&["slow", "next"]), settings()).await;
    let driver = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.run_to_end().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.has_active_tab());
    assert_eq!(browser.open_now(), 1);

    assert!(coordinator.stop().await.accepted);
    assert_eq!(browser.open_now(), 0);
    assert!(!coordinator.has_active_tab());

    let status = tokio::time::timeout(Duration::from_secs(2), driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, RunStatus::Idle);

    // The cut-off target is neither recorded nor counted as failed
    let run = coordinator.snapshot();
    assert_eq!(run.cursor(), 0);
    assert!(run.records().is_empty());
    assert!(run.failures().is_empty());
    assert_eq!(browser.visited(), vec!["https://example.com/groups/slow/"]);
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_checkpoint_after_restart() {
    let dir = TempDir::new().unwrap();

    {
        let coordinator = fast_builder(
            Arc::new(FakeBrowser::default()),
            EchoExtractor::default(),
            sqlite_store(&dir),
            EventStream::new(64),
        )
        .build();

        coordinator
            .start(targets(&["first", "second", "third"]), settings())
            .await;
        coordinator.process_next().await;
        assert_eq!(coordinator.snapshot().cursor(), 1);
        // Dropped mid-run, as if the process had been killed
    }

    let browser = Arc::new(FakeBrowser::default());
    let coordinator = fast_builder(
        browser.clone(),
        EchoExtractor::default(),
        sqlite_store(&dir),
        EventStream::new(64),
    )
    .restore()
    .await;

    let restored = coordinator.snapshot();
    assert_eq!(restored.status(), RunStatus::Idle);
    assert_eq!(restored.cursor(), 1);
    assert_eq!(restored.records().len(), 1);
    assert!(restored.is_resumable());

    assert!(coordinator.resume().await.accepted);
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    // The first target is never visited again
    assert_eq!(
        browser.visited(),
        vec![
            "https://example.com/groups/second/",
            "https://example.com/groups/third/",
        ]
    );
    let ids: Vec<_> = coordinator
        .records()
        .iter()
        .map(|r| r.target_id.clone())
        .collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_finished_run_is_not_resumable() {
    let dir = TempDir::new().unwrap();

    {
        let coordinator = fast_builder(
            Arc::new(FakeBrowser::default()),
            EchoExtractor::default(),
            sqlite_store(&dir),
            EventStream::new(64),
        )
        .build();
        coordinator.start(targets(&["only"]), settings()).await;
        assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);
    }

    let coordinator = fast_builder(
        Arc::new(FakeBrowser::default()),
        EchoExtractor::default(),
        sqlite_store(&dir),
        EventStream::new(64),
    )
    .restore()
    .await;

    assert_eq!(coordinator.status(), RunStatus::Completed);
    assert_eq!(coordinator.records().len(), 1);
    assert!(!coordinator.resume().await.accepted);
}

#[tokio::test]
async fn test_start_is_rejected_while_a_run_is_active() {
    let coordinator = fast_builder(
        Arc::new(FakeBrowser::default()),
        EchoExtractor::default(),
        RunStore::in_memory(),
        EventStream::new(64),
    )
    .build();

    coordinator.start(targets(&["a", "b", "c"]), settings()).await;
    coordinator.process_next().await;
    let before = coordinator.snapshot();

    let ack = coordinator.start(targets(&["other"]), settings()).await;
    assert!(!ack.accepted);
    assert!(ack.reason.is_some());
    assert_eq!(coordinator.snapshot(), before);

    assert!(!coordinator.resume().await.accepted);
}

#[tokio::test]
async fn test_simulated_run_produces_records_without_tabs() {
    let browser = Arc::new(FakeBrowser::default());
    let coordinator = fast_builder(
        browser.clone(),
        EchoExtractor::default(),
        RunStore::in_memory(),
        EventStream::new(64),
    )
    .build();

    let settings = CollectionSettings {
        items_per_target: 5,
        include_secondary: true,
        use_simulated_data: true,
    };
    coordinator.start(targets(&["sim-a", "sim-b"]), settings).await;
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let records = coordinator.records();
    assert_eq!(records.len(), 10);
    assert!(records[..5].iter().all(|r| r.target_id == "sim-a"));
    assert!(records[5..].iter().all(|r| r.target_id == "sim-b"));
    assert!(records.iter().all(|r| !r.content.is_empty()));
    assert!(records.iter().all(|r| r.comments.len() <= 5));
    assert!(browser.visited().is_empty());
}

#[tokio::test]
async fn test_log_sink_keeps_only_the_newest_entries() {
    let store = RunStore::in_memory();
    let sink = LogSink::restore(store.clone(), 100).await.unwrap();

    let stream = EventStream::new(512);
    let task = tokio::spawn(sink.clone().run(stream.subscribe()));

    for i in 0..250 {
        stream.publish(&LogEntry::new(LogLevel::Info, format!("entry {}", i)));
    }
    drop(stream);
    task.await.unwrap();

    let persisted = store.load_logs().await.unwrap();
    assert_eq!(persisted.len(), 100);
    assert_eq!(persisted[0].message, "entry 150");
    assert_eq!(persisted[99].message, "entry 249");
    assert_eq!(sink.entries(), persisted);
}
