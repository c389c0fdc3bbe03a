//! Command handling for the control surface
//!
//! The control surface never touches the run directly. It sends `Command`s
//! over the bus; this service answers them against the coordinator and the
//! log sink, and starts a driver task whenever a run is (re)started.

use crate::bus::{Command, CommandAck, CommandReply, Responder};
use crate::collector::coordinator::CollectionCoordinator;
use crate::logging::LogSink;

/// Serves control commands for one coordinator
#[derive(Clone)]
pub struct ControlService {
    coordinator: CollectionCoordinator,
    logs: LogSink,
}

impl ControlService {
    pub fn new(coordinator: CollectionCoordinator, logs: LogSink) -> Self {
        Self { coordinator, logs }
    }

    pub fn coordinator(&self) -> &CollectionCoordinator {
        &self.coordinator
    }

    /// Answers a single command
    pub async fn handle(&self, command: Command) -> CommandReply {
        match command {
            Command::StartCollection { targets, settings } => {
                let ack = self.coordinator.start(targets, settings).await;
                if ack.accepted {
                    self.spawn_driver();
                }
                CommandReply::Ack(ack)
            }
            Command::Resume => {
                let ack = self.coordinator.resume().await;
                if ack.accepted {
                    self.spawn_driver();
                }
                CommandReply::Ack(ack)
            }
            Command::StopCollection => CommandReply::Ack(self.coordinator.stop().await),
            Command::ExportResults => CommandReply::Export {
                bytes: self.coordinator.export_csv(),
            },
            Command::GetStatus => CommandReply::Status {
                run: self.coordinator.snapshot(),
            },
            Command::GetLogs => CommandReply::Logs {
                entries: self.logs.entries(),
            },
            Command::ClearLogs => match self.logs.clear().await {
                Ok(()) => CommandReply::Ack(CommandAck::accepted()),
                Err(e) => CommandReply::Ack(CommandAck::rejected(format!(
                    "Failed to clear logs: {}",
                    e
                ))),
            },
        }
    }

    /// Answers commands until every sender is gone
    pub async fn serve(self, responder: Responder<Command, CommandReply>) {
        responder
            .serve(|command| {
                let service = self.clone();
                async move { service.handle(command).await }
            })
            .await;
        tracing::debug!("Control channel closed");
    }

    fn spawn_driver(&self) {
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let status = coordinator.run_to_end().await;
            tracing::debug!("Driver finished with status {}", status);
        });
    }
}
