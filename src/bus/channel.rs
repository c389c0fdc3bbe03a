//! Request/response channel between execution contexts
//!
//! Payloads cross the channel as JSON text so the two ends never share memory,
//! which mirrors calls into a page context that may disappear at any moment.

use crate::bus::{BusError, BusResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

struct Envelope {
    payload: String,
    reply: oneshot::Sender<String>,
}

/// Creates a connected requester/responder pair
///
/// `capacity` bounds the number of requests queued but not yet picked up.
pub fn request_channel<Req, Resp>(capacity: usize) -> (Requester<Req, Resp>, Responder<Req, Resp>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Requester {
            tx,
            _marker: PhantomData,
        },
        Responder {
            rx,
            _marker: PhantomData,
        },
    )
}

/// Calling side of a request channel
pub struct Requester<Req, Resp> {
    tx: mpsc::Sender<Envelope>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Clone for Requester<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Requester<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<Req, Resp> Requester<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Sends `request` and waits for the single reply
    ///
    /// # Errors
    ///
    /// * `BusError::Timeout` - no reply within `timeout`
    /// * `BusError::Unreachable` - the responder is gone, or dropped the request
    /// * `BusError::Codec` - either payload failed to (de)serialize
    pub async fn request(&self, request: &Req, timeout: Duration) -> BusResult<Resp> {
        let payload = serde_json::to_string(request).map_err(|e| BusError::Codec(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let exchange = async {
            self.tx
                .send(Envelope {
                    payload,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| BusError::Unreachable)?;
            reply_rx.await.map_err(|_| BusError::Unreachable)
        };

        let raw = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| BusError::Timeout(timeout))??;

        serde_json::from_str(&raw).map_err(|e| BusError::Codec(e.to_string()))
    }

    /// Returns true once the responding context has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Answering side of a request channel
pub struct Responder<Req, Resp> {
    rx: mpsc::Receiver<Envelope>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

/// Handle used to answer exactly one request
pub struct Reply<Resp> {
    tx: oneshot::Sender<String>,
    _marker: PhantomData<fn(Resp)>,
}

impl<Resp: Serialize> Reply<Resp> {
    /// Sends the response back to the caller
    ///
    /// Returns false if the caller stopped waiting (timed out or went away).
    pub fn respond(self, response: &Resp) -> bool {
        match serde_json::to_string(response) {
            Ok(text) => self.tx.send(text).is_ok(),
            Err(e) => {
                tracing::warn!("Dropping unserializable reply: {}", e);
                false
            }
        }
    }
}

impl<Req, Resp> Responder<Req, Resp>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    /// Waits for the next well-formed request
    ///
    /// Returns `None` once every requester has been dropped. Requests that do
    /// not decode are dropped, which the caller observes as `Unreachable`.
    pub async fn next(&mut self) -> Option<(Req, Reply<Resp>)> {
        loop {
            let envelope = self.rx.recv().await?;
            match serde_json::from_str(&envelope.payload) {
                Ok(request) => {
                    return Some((
                        request,
                        Reply {
                            tx: envelope.reply,
                            _marker: PhantomData,
                        },
                    ))
                }
                Err(e) => tracing::warn!("Dropping malformed request: {}", e),
            }
        }
    }

    /// Answers requests with `handler` until every requester is gone
    pub async fn serve<F, Fut>(mut self, mut handler: F)
    where
        F: FnMut(Req) -> Fut,
        Fut: std::future::Future<Output = Resp>,
    {
        while let Some((request, reply)) = self.next().await {
            let response = handler(request).await;
            if !reply.respond(&response) {
                tracing::debug!("Caller went away before the reply was sent");
            }
        }
    }
}
