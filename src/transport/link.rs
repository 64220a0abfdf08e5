//! Control link to the external controller.
//!
//! One link per (tab, channel name). The link owns a spawned event loop
//! task that:
//!
//! - Forwards inbound text frames as [`LinkEvent::Message`]
//! - Writes outbound frames queued with [`ControlLink::send`]
//! - Reports closes and transport errors as events
//!
//! Closes and errors share the event path; the link never reconnects on
//! its own.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// LinkEvent
// ============================================================================

/// Event emitted by a control link's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Inbound frame. Non-JSON text arrives as [`Value::String`].
    Message(Value),
    /// Link closed.
    Closed {
        /// Whether a close handshake took place.
        was_clean: bool,
    },
    /// Transport error; the link is gone.
    Error(String),
}

// ============================================================================
// LinkCommand
// ============================================================================

/// Command consumed by a link's event loop.
///
/// Public so custom [`LinkConnector`]s can drive their own transports.
#[derive(Debug)]
pub enum LinkCommand {
    /// Write a text frame.
    Send(String),
    /// Close the link; the sender is notified once the loop has stopped.
    Close(oneshot::Sender<()>),
}

// ============================================================================
// ControlLink
// ============================================================================

/// Handle to an open control link.
#[derive(Debug, Clone)]
pub struct ControlLink {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl ControlLink {
    /// Wraps the command channel of a running link event loop.
    #[inline]
    #[must_use]
    pub fn new(command_tx: mpsc::UnboundedSender<LinkCommand>) -> Self {
        Self { command_tx }
    }

    /// Queues a text frame for the controller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the link and waits until its event loop has stopped.
    ///
    /// Returns immediately if the link is already gone. Gives up waiting
    /// after `wait`.
    pub async fn close(&self, wait: Duration) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.command_tx.send(LinkCommand::Close(ack_tx)).is_err() {
            return;
        }

        if timeout(wait, ack_rx).await.is_err() {
            warn!(timeout_ms = wait.as_millis() as u64, "Control link did not close in time");
        }
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

// ============================================================================
// LinkConnector
// ============================================================================

/// Opens control links.
///
/// The supervisor calls this for every connect attempt. Events for the
/// returned link must be delivered on `events`.
#[async_trait]
pub trait LinkConnector: Send + Sync + 'static {
    /// Opens a link to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the transport cannot be established.
    async fn open(&self, url: &Url, events: mpsc::UnboundedSender<LinkEvent>)
    -> Result<ControlLink>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket implementation of [`LinkConnector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl LinkConnector for WsConnector {
    async fn open(
        &self,
        url: &Url,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<ControlLink> {
        debug!(%url, "Opening control link");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        info!(%url, "Control link connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_event_loop(ws_stream, command_rx, events));

        Ok(ControlLink::new(command_tx))
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O for one link.
async fn run_event_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Frames from the controller
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(LinkEvent::Message(parse_frame(text.as_str())));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Control link closed by remote");
                        // Flushes the queued close reply.
                        let _ = ws_write.close().await;
                        let _ = events.send(LinkEvent::Closed { was_clean: true });
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Control link error");
                        let _ = events.send(LinkEvent::Error(e.to_string()));
                        break;
                    }

                    None => {
                        debug!("Control link stream ended");
                        let _ = events.send(LinkEvent::Closed { was_clean: false });
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the supervisor
            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(text)) => {
                        trace!(len = text.len(), "Sending frame");
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            let _ = events.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }

                    Some(LinkCommand::Close(ack)) => {
                        debug!("Close command received");
                        let _ = ws_write.close().await;
                        let _ = events.send(LinkEvent::Closed { was_clean: true });
                        let _ = ack.send(());
                        break;
                    }

                    None => {
                        debug!("Link handle dropped");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    debug!("Control link event loop terminated");
}

/// Parses an inbound text frame, falling back to a JSON string.
fn parse_frame(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(error = %e, "Control link frame is not valid JSON, forwarding as string");
        Value::String(text.to_string())
    })
}

// ============================================================================
// Tests
// ============================================================================
