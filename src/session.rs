//! Connection sessions bridging hub subscriptions to WebSocket clients.
//!
//! A session subscribes on start and holds the registration in a
//! [`SubscriptionGuard`]. The guard unsubscribes when dropped, which covers
//! normal close, write errors, hub eviction, shutdown and task cancellation
//! alike.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::hub::{BroadcastHub, EventSink, SubscriptionHandle};
use crate::models::{CloseReason, FileArrivalEvent, SessionId, SessionState};

/// Outbound half of a client connection.
#[async_trait]
pub trait MessageWriter: Send {
    /// Write one text frame.
    async fn write_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection from our side.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl MessageWriter for SplitSink<WebSocket, Message> {
    async fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

/// Keeps a hub registration alive for as long as it is held.
pub struct SubscriptionGuard {
    hub: Arc<BroadcastHub>,
    handle: SubscriptionHandle,
}

impl SubscriptionGuard {
    /// Subscribe `sink` under `id` and tie the registration to the guard.
    pub fn acquire(hub: Arc<BroadcastHub>, id: SessionId, sink: impl EventSink + 'static) -> Self {
        let handle = hub.subscribe(id, sink);
        Self { hub, handle }
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.handle);
    }
}

/// Resolves once shutdown has been signalled or the signal sender is gone.
pub async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// One live client connection paired with exactly one hub subscription.
pub struct ConnectionSession {
    id: SessionId,
    state: SessionState,
    hub: Arc<BroadcastHub>,
    queue_capacity: usize,
}

impl ConnectionSession {
    /// Create a session with a freshly allocated id.
    pub fn new(hub: Arc<BroadcastHub>, queue_capacity: usize) -> Self {
        Self::with_id(SessionId::new(), hub, queue_capacity)
    }

    pub fn with_id(id: SessionId, hub: Arc<BroadcastHub>, queue_capacity: usize) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            hub,
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Forward hub events to `writer` until the connection ends.
    ///
    /// Inbound frames are only watched for close; their content is ignored.
    pub async fn run<W, R, E>(
        mut self,
        mut writer: W,
        mut reader: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> CloseReason
    where
        W: MessageWriter,
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: std::fmt::Display + Send,
    {
        let (tx, mut rx) = mpsc::channel::<FileArrivalEvent>(self.queue_capacity);
        let guard = SubscriptionGuard::acquire(Arc::clone(&self.hub), self.id.clone(), tx);
        self.transition(SessionState::Active);

        let mut forwarded: u64 = 0;
        let reason = loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        break CloseReason::Evicted;
                    };
                    if let Err(e) = forward(&mut writer, &event).await {
                        warn!(session_id = %self.id, error = %e, "Failed to forward event");
                        break CloseReason::TransportError;
                    }
                    forwarded += 1;
                }
                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                        Some(Err(e)) => {
                            debug!(session_id = %self.id, error = %e, "Read error");
                            break CloseReason::TransportError;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown_signalled(&mut shutdown) => break CloseReason::Shutdown,
            }
        };

        drop(guard);
        drop(rx);

        if reason != CloseReason::TransportError {
            if let Err(e) = writer.close().await {
                debug!(session_id = %self.id, error = %e, "Close failed");
            }
        }

        self.transition(SessionState::Closed);
        info!(session_id = %self.id, reason = %reason, forwarded, "Session closed");
        reason
    }
}

async fn forward<W: MessageWriter>(
    writer: &mut W,
    event: &FileArrivalEvent,
) -> Result<(), TransportError> {
    let text = serde_json::to_string(event)?;
    writer.write_text(text).await
}
