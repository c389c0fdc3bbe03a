//! Long-lived event streams
//!
//! Fire-and-forget fan-out used for progress updates and log lines. Events are
//! serialized on publish and decoded per subscriber, like the request channel.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Publishing side of an event stream
pub struct EventStream<T> {
    tx: broadcast::Sender<String>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> EventStream<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a stream buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            _marker: PhantomData,
        }
    }

    /// Publishes `event` to every current subscriber
    ///
    /// Never fails: with no subscriber open the event is dropped. Returns the
    /// number of subscribers that will see it. This path must stay silent
    /// because the log layer publishes from inside tracing callbacks.
    pub fn publish(&self, event: &T) -> usize {
        match serde_json::to_string(event) {
            Ok(text) => self.tx.send(text).unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
            skipped: 0,
            _marker: PhantomData,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving side of an event stream
pub struct Subscription<T> {
    rx: broadcast::Receiver<String>,
    skipped: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Waits for the next event
    ///
    /// Returns `None` once every publisher is gone. A subscriber that fell
    /// behind skips the overwritten events and carries on.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(text) => {
                    if let Some(event) = self.decode(&text) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(n)) => self.skipped += n,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(text) => {
                    if let Some(event) = self.decode(&text) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Lagged(n)) => self.skipped += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Number of events this subscriber missed by lagging or failing to decode
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn decode(&mut self, text: &str) -> Option<T> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(_) => {
                self.skipped += 1;
                None
            }
        }
    }
}
