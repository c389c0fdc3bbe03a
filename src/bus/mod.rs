//! Message bus connecting the execution contexts
//!
//! Two interaction shapes are provided:
//! - Request/response channels with caller-side timeouts (commands, extraction calls)
//! - Long-lived event streams (progress updates, log lines)
//!
//! Both carry serialized payloads, so no mutable state is shared across contexts.

mod channel;
mod messages;
mod stream;

pub use channel::{request_channel, Reply, Requester, Responder};
pub use messages::{
    CollectionEvent, Command, CommandAck, CommandReply, ExtractionRequest, ExtractionResponse,
};
pub use stream::{EventStream, Subscription};

use crate::model::LogEntry;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by bus calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Receiving context is unreachable")]
    Unreachable,

    #[error("Message codec error: {0}")]
    Codec(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Default buffer for event streams
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Handles shared by every context taking part in a collection
///
/// Cloning is cheap; each clone talks to the same channels.
#[derive(Clone)]
pub struct MessageBus {
    commands: Requester<Command, CommandReply>,
    events: EventStream<CollectionEvent>,
    logs: EventStream<LogEntry>,
}

impl MessageBus {
    /// Creates the bus and the responder the coordinator's control service serves
    pub fn new(stream_capacity: usize) -> (Self, Responder<Command, CommandReply>) {
        let (commands, responder) = request_channel(32);
        (
            Self {
                commands,
                events: EventStream::new(stream_capacity),
                logs: EventStream::new(stream_capacity),
            },
            responder,
        )
    }

    /// Sends a command to the coordinator and waits for its reply
    pub async fn send(&self, command: &Command, timeout: Duration) -> BusResult<CommandReply> {
        self.commands.request(command, timeout).await
    }

    pub fn events(&self) -> &EventStream<CollectionEvent> {
        &self.events
    }

    pub fn logs(&self) -> &EventStream<LogEntry> {
        &self.logs
    }
}
