//! Commands sent over the message bus to the control service

use crate::common::{fast_builder, settings, targets, EchoExtractor, FakeBrowser};
use group_harvest::bus::{
    CollectionEvent, Command, CommandReply, MessageBus, Subscription, DEFAULT_STREAM_CAPACITY,
};
use group_harvest::collector::ControlService;
use group_harvest::logging::LogSink;
use group_harvest::model::{LogEntry, LogLevel, RunStatus};
use group_harvest::output::CSV_HEADER;
use group_harvest::storage::RunStore;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_service(extractor: EchoExtractor) -> (MessageBus, LogSink) {
    let (bus, responder) = MessageBus::new(DEFAULT_STREAM_CAPACITY);
    let store = RunStore::in_memory();
    let sink = LogSink::restore(store.clone(), 50).await.unwrap();

    let coordinator = fast_builder(
        Arc::new(FakeBrowser::default()),
        extractor,
        store,
        bus.events().clone(),
    )
    .build();

    tokio::spawn(ControlService::new(coordinator, sink.clone()).serve(responder));
    (bus, sink)
}

async fn send(bus: &MessageBus, command: Command) -> CommandReply {
    bus.send(&command, TIMEOUT).await.unwrap()
}

fn accepted(reply: &CommandReply) -> bool {
    matches!(reply, CommandReply::Ack(ack) if ack.accepted)
}

/// Waits until the run settles and returns the status it settled in
async fn settled(events: &mut Subscription<CollectionEvent>) -> RunStatus {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(CollectionEvent::StatusChanged { status })
                    if matches!(
                        status,
                        RunStatus::Idle | RunStatus::Completed | RunStatus::Failed
                    ) =>
                {
                    return status
                }
                Some(_) => {}
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_start_command_runs_collection_to_completion() {
    let (bus, _sink) = start_service(EchoExtractor::default()).await;
    let mut events = bus.events().subscribe();

    let reply = send(
        &bus,
        Command::StartCollection {
            targets: targets(&["a", "b"]),
            settings: settings(),
        },
    )
    .await;
    assert!(accepted(&reply));
    assert_eq!(settled(&mut events).await, RunStatus::Completed);

    match send(&bus, Command::GetStatus).await {
        CommandReply::Status { run } => {
            assert_eq!(run.status(), RunStatus::Completed);
            assert_eq!(run.records().len(), 2);
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    match send(&bus, Command::ExportResults).await {
        CommandReply::Export { bytes } => {
            let csv = String::from_utf8(bytes).unwrap();
            assert!(csv.starts_with(&CSV_HEADER.join(",")));
            assert_eq!(csv.lines().count(), 3);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let (bus, _sink) = start_service(EchoExtractor {
        delay: Duration::from_millis(200),
    })
    .await;
    let mut events = bus.events().subscribe();

    let start = Command::StartCollection {
        targets: targets(&["a", "b"]),
        settings: settings(),
    };
    assert!(accepted(&send(&bus, start.clone()).await));

    match send(&bus, start).await {
        CommandReply::Ack(ack) => {
            assert!(!ack.accepted);
            assert!(ack.reason.is_some());
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert_eq!(settled(&mut events).await, RunStatus::Completed);
}

#[tokio::test]
async fn test_stop_then_resume_over_the_bus() {
    let (bus, _sink) = start_service(EchoExtractor {
        delay: Duration::from_millis(100),
    })
    .await;
    let mut events = bus.events().subscribe();

    send(
        &bus,
        Command::StartCollection {
            targets: targets(&["a", "b", "c", "d"]),
            settings: settings(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(accepted(&send(&bus, Command::StopCollection).await));
    assert_eq!(settled(&mut events).await, RunStatus::Idle);

    let stopped_at = match send(&bus, Command::GetStatus).await {
        CommandReply::Status { run } => {
            assert!(run.is_resumable());
            run.cursor()
        }
        other => panic!("unexpected reply: {:?}", other),
    };
    assert!(stopped_at < 4);

    assert!(accepted(&send(&bus, Command::Resume).await));
    assert_eq!(settled(&mut events).await, RunStatus::Completed);

    match send(&bus, Command::GetStatus).await {
        CommandReply::Status { run } => {
            assert_eq!(run.cursor(), 4);
            let ids: Vec<_> = run.records().iter().map(|r| r.target_id.as_str()).collect();
            let mut deduped = ids.clone();
            deduped.dedup();
            assert_eq!(ids, deduped);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_without_a_run_is_rejected() {
    let (bus, _sink) = start_service(EchoExtractor::default()).await;
    assert!(!accepted(&send(&bus, Command::StopCollection).await));
    assert!(!accepted(&send(&bus, Command::Resume).await));
}

#[tokio::test]
async fn test_get_and_clear_logs() {
    let (bus, sink) = start_service(EchoExtractor::default()).await;
    sink.append(LogEntry::new(LogLevel::Warn, "tab closed early").with_context("page"));

    match send(&bus, Command::GetLogs).await {
        CommandReply::Logs { entries } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].context.as_deref(), Some("page"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert!(accepted(&send(&bus, Command::ClearLogs).await));
    match send(&bus, Command::GetLogs).await {
        CommandReply::Logs { entries } => assert!(entries.is_empty()),
        other => panic!("unexpected reply: {:?}", other),
    }
}
