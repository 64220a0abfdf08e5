//! Supervisor event loop.
//!
//! A single task owns the [`ConnectionRegistry`]. Every input (bridge
//! messages, link events, capture completions, tab lifecycle) arrives as a
//! [`SupervisorEvent`] and is handled in order, so per-tab state never
//! needs a lock.
//!
//! Link attempts carry a generation. Events from a link whose generation
//! is no longer current are ignored, and a link that finishes opening
//! after it was superseded is closed immediately.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelName, RequestId, TabId};
use crate::protocol::{DetachReason, ExecutorMessage, LinkStatus, SupervisorMessage};
use crate::relay::RelayOptions;
use crate::transport::{
    BridgeChannel, ControlLink, ExecutorPort, LinkConnector, LinkEvent, SupervisorEnd,
};

use super::capture::{SurfaceCapture, capture_tab};
use super::registry::{BridgeEndpoint, ConnectionRegistry, LinkState, TabSnapshot};

// ============================================================================
// SupervisorEvent
// ============================================================================

/// Input to the supervisor event loop.
pub(crate) enum SupervisorEvent {
    /// New bridge for a tab.
    Attach { tab_id: TabId, end: SupervisorEnd },

    /// Message received on a bridge.
    Bridge {
        tab_id: TabId,
        generation: u64,
        message: ExecutorMessage,
    },

    /// Executor end of a bridge went away.
    BridgeClosed { tab_id: TabId, generation: u64 },

    /// A link attempt finished.
    LinkOpened {
        tab_id: TabId,
        generation: u64,
        result: Result<ControlLink>,
    },

    /// Event from an open link.
    Link {
        tab_id: TabId,
        generation: u64,
        event: LinkEvent,
    },

    /// A capture finished.
    CaptureDone {
        tab_id: TabId,
        request_id: RequestId,
        result: Result<String>,
    },

    /// Tab was closed by the host.
    TabRemoved(TabId),

    /// Tab navigated to a new page.
    TabNavigated(TabId),

    /// Snapshot query.
    Snapshot {
        tab_id: TabId,
        reply: oneshot::Sender<Option<TabSnapshot>>,
    },

    /// Close every link and stop.
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// SupervisorHandle
// ============================================================================

/// Handle to a running supervisor.
///
/// Cloneable; the event loop stops once every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    event_tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl std::fmt::Debug for SupervisorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Attach { .. } => "Attach",
            Self::Bridge { .. } => "Bridge",
            Self::BridgeClosed { .. } => "BridgeClosed",
            Self::LinkOpened { .. } => "LinkOpened",
            Self::Link { .. } => "Link",
            Self::CaptureDone { .. } => "CaptureDone",
            Self::TabRemoved(_) => "TabRemoved",
            Self::TabNavigated(_) => "TabNavigated",
            Self::Snapshot { .. } => "Snapshot",
            Self::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SupervisorHandle {
    /// Attaches a new bridge for `tab_id` and returns the executor side.
    ///
    /// An existing bridge for the tab is replaced and receives
    /// `BRIDGE_DETACHED` as its last message. The control link is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorGone`] if the event loop has stopped.
    pub fn attach(&self, tab_id: TabId) -> Result<ExecutorPort> {
        let (end, port) = BridgeChannel::pair(tab_id);
        self.send(SupervisorEvent::Attach { tab_id, end })?;
        Ok(port)
    }

    /// Reports that `tab_id` was closed.
    ///
    /// The attached executor is released, the link is closed and the
    /// tab's state is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorGone`] if the event loop has stopped.
    pub fn tab_removed(&self, tab_id: TabId) -> Result<()> {
        self.send(SupervisorEvent::TabRemoved(tab_id))
    }

    /// Reports that `tab_id` started a top-level navigation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorGone`] if the event loop has stopped.
    pub fn tab_navigated(&self, tab_id: TabId) -> Result<()> {
        self.send(SupervisorEvent::TabNavigated(tab_id))
    }

    /// Returns the current state of `tab_id`, or `None` if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorGone`] if the event loop has stopped.
    pub async fn snapshot(&self, tab_id: TabId) -> Result<Option<TabSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorEvent::Snapshot { tab_id, reply })?;
        rx.await.map_err(|_| Error::SupervisorGone)
    }

    /// Closes every link and stops the event loop.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.send(SupervisorEvent::Shutdown(ack)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.event_tx.is_closed()
    }

    fn send(&self, event: SupervisorEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| Error::SupervisorGone)
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Process-wide owner of control links and bridges.
pub struct Supervisor {
    options: RelayOptions,
    connector: Arc<dyn LinkConnector>,
    capture: Arc<dyn SurfaceCapture>,
    registry: ConnectionRegistry,
    /// Generation counter shared by bridges and links.
    generation: u64,
    /// Weak so that spawned tasks never keep the loop alive.
    event_tx: mpsc::WeakUnboundedSender<SupervisorEvent>,
    event_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl Supervisor {
    /// Spawns the supervisor event loop.
    #[must_use]
    pub fn spawn(
        options: RelayOptions,
        connector: Arc<dyn LinkConnector>,
        capture: Arc<dyn SurfaceCapture>,
    ) -> SupervisorHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            options,
            connector,
            capture,
            registry: ConnectionRegistry::new(),
            generation: 0,
            event_tx: event_tx.downgrade(),
            event_rx,
        };

        tokio::spawn(supervisor.run());

        SupervisorHandle { event_tx }
    }

    async fn run(mut self) {
        debug!("Supervisor event loop started");

        while let Some(event) = self.event_rx.recv().await {
            trace!(?event, "Supervisor event");

            match event {
                SupervisorEvent::Attach { tab_id, end } => self.handle_attach(tab_id, end),

                SupervisorEvent::Bridge {
                    tab_id,
                    generation,
                    message,
                } => self.handle_bridge_message(tab_id, generation, message).await,

                SupervisorEvent::BridgeClosed { tab_id, generation } => {
                    self.handle_bridge_closed(tab_id, generation);
                }

                SupervisorEvent::LinkOpened {
                    tab_id,
                    generation,
                    result,
                } => self.handle_link_opened(tab_id, generation, result),

                SupervisorEvent::Link {
                    tab_id,
                    generation,
                    event,
                } => self.handle_link_event(tab_id, generation, event),

                SupervisorEvent::CaptureDone {
                    tab_id,
                    request_id,
                    result,
                } => self.handle_capture_done(tab_id, request_id, result),

                SupervisorEvent::TabRemoved(tab_id) => self.handle_tab_removed(tab_id).await,

                SupervisorEvent::TabNavigated(tab_id) => self.handle_tab_navigated(tab_id).await,

                SupervisorEvent::Snapshot { tab_id, reply } => {
                    let _ = reply.send(self.registry.get(tab_id).map(|tab| tab.snapshot()));
                }

                SupervisorEvent::Shutdown(ack) => {
                    self.event_rx.close();
                    self.close_all().await;
                    let _ = ack.send(());
                    break;
                }
            }
        }

        self.close_all().await;
        debug!("Supervisor event loop terminated");
    }

    #[inline]
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

// ============================================================================
// Bridge Handling
// ============================================================================

impl Supervisor {
    fn handle_attach(&mut self, tab_id: TabId, end: SupervisorEnd) {
        let generation = self.next_generation();
        let SupervisorEnd { tx, mut rx } = end;
        let events = self.event_tx.clone();

        let forwarder = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(events) = events.upgrade() else {
                    return;
                };
                let event = SupervisorEvent::Bridge {
                    tab_id,
                    generation,
                    message,
                };
                if events.send(event).is_err() {
                    return;
                }
            }

            if let Some(events) = events.upgrade() {
                let _ = events.send(SupervisorEvent::BridgeClosed { tab_id, generation });
            }
        })
        .abort_handle();

        let entry = self.registry.entry(tab_id);
        let replaced = entry.attach_bridge(BridgeEndpoint {
            generation,
            tx,
            forwarder,
        });

        match replaced {
            Some(old) => {
                old.release(DetachReason::Replaced);
                info!(%tab_id, "Bridge replaced");
            }
            None => info!(%tab_id, "Bridge attached"),
        }
    }

    fn handle_bridge_closed(&mut self, tab_id: TabId, generation: u64) {
        if let Some(entry) = self.registry.get_mut(tab_id)
            && entry.detach_bridge(generation)
        {
            info!(%tab_id, link_state = ?entry.link_state(), "Bridge detached");
        }
    }

    async fn handle_bridge_message(
        &mut self,
        tab_id: TabId,
        generation: u64,
        message: ExecutorMessage,
    ) {
        let current = self
            .registry
            .get(tab_id)
            .is_some_and(|entry| entry.is_bridge(generation));
        if !current {
            debug!(%tab_id, generation, "Ignoring message from replaced bridge");
            return;
        }

        match message {
            ExecutorMessage::ConnectLink { channel_name } => {
                self.connect(tab_id, channel_name).await;
            }
            ExecutorMessage::DisconnectLink { channel_name } => {
                self.disconnect(tab_id, &channel_name).await;
            }
            ExecutorMessage::ForwardToLink { payload } => self.forward(tab_id, &payload),
            ExecutorMessage::RequestTabCapture {
                tab_id: target,
                request_id,
            } => self.start_capture(tab_id, target, request_id),
        }
    }
}

// ============================================================================
// Link Handling
// ============================================================================

impl Supervisor {
    async fn connect(&mut self, tab_id: TabId, channel_name: ChannelName) {
        let url = match self.options.endpoint_url(&channel_name) {
            Ok(url) => url,
            Err(e) => {
                warn!(%tab_id, %channel_name, error = %e, "Cannot build endpoint");
                self.registry
                    .entry(tab_id)
                    .notify(SupervisorMessage::status(
                        LinkStatus::error(e.reason()),
                        Some(channel_name),
                    ));
                return;
            }
        };

        let generation = self.next_generation();
        let close_timeout = self.options.link_close_timeout;
        let entry = self.registry.entry(tab_id);
        let same_channel = entry.is_channel(&channel_name);

        match entry.link_state() {
            LinkState::Open if same_channel => {
                debug!(%tab_id, %channel_name, "Link already open");
                entry.notify_status(LinkStatus::Connected);
                return;
            }
            LinkState::Connecting if same_channel => {
                debug!(%tab_id, %channel_name, "Link already connecting");
                return;
            }
            LinkState::Open | LinkState::Connecting => {
                info!(%tab_id, %channel_name, "Replacing link for new channel");
                if let Some(link) = entry.take_link() {
                    link.close(close_timeout).await;
                }
            }
            LinkState::Absent | LinkState::Closed => {}
        }

        entry.begin_connect(channel_name, generation);
        info!(%tab_id, %url, generation, "Opening control link");

        let connector = Arc::clone(&self.connector);
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let (link_tx, mut link_rx) = mpsc::unbounded_channel();
            let result = connector.open(&url, link_tx).await;

            let Some(sender) = events.upgrade() else {
                if let Ok(link) = result {
                    link.close(close_timeout).await;
                }
                return;
            };

            let opened = result.is_ok();
            let _ = sender.send(SupervisorEvent::LinkOpened {
                tab_id,
                generation,
                result,
            });
            drop(sender);

            if !opened {
                return;
            }

            while let Some(event) = link_rx.recv().await {
                let Some(sender) = events.upgrade() else {
                    return;
                };
                let event = SupervisorEvent::Link {
                    tab_id,
                    generation,
                    event,
                };
                if sender.send(event).is_err() {
                    return;
                }
            }
        });
    }

    async fn disconnect(&mut self, tab_id: TabId, channel_name: &ChannelName) {
        let close_timeout = self.options.link_close_timeout;
        let entry = self.registry.entry(tab_id);

        if !(entry.has_active_link() && entry.is_channel(channel_name)) {
            debug!(%tab_id, %channel_name, "Disconnect for inactive channel");
            entry.notify(SupervisorMessage::status(
                LinkStatus::NotConnected,
                Some(channel_name.clone()),
            ));
            return;
        }

        if let Some(link) = entry.take_link() {
            link.close(close_timeout).await;
        }

        info!(%tab_id, %channel_name, "Control link closed on request");
        entry.notify_status(LinkStatus::Disconnected { was_clean: true });
    }

    fn forward(&self, tab_id: TabId, payload: &Value) {
        let Some(link) = self.registry.get(tab_id).and_then(|e| e.open_link()) else {
            warn!(%tab_id, "Control link not open, dropping outbound payload");
            return;
        };

        match serde_json::to_string(payload) {
            Ok(text) => {
                if let Err(e) = link.send(text) {
                    warn!(%tab_id, error = %e, "Failed to queue outbound payload");
                }
            }
            Err(e) => warn!(%tab_id, error = %e, "Failed to serialize outbound payload"),
        }
    }

    fn handle_link_opened(&mut self, tab_id: TabId, generation: u64, result: Result<ControlLink>) {
        let close_timeout = self.options.link_close_timeout;

        let entry = match self.registry.get_mut(tab_id) {
            Some(entry)
                if entry.link_generation() == generation
                    && entry.link_state() == LinkState::Connecting =>
            {
                entry
            }
            _ => {
                if let Ok(link) = result {
                    debug!(%tab_id, generation, "Closing superseded link");
                    tokio::spawn(async move { link.close(close_timeout).await });
                }
                return;
            }
        };

        match result {
            Ok(link) => {
                entry.mark_open(link);
                info!(%tab_id, generation, "Control link open");
                entry.notify_status(LinkStatus::Connected);
            }
            Err(e) => {
                entry.mark_closed();
                warn!(%tab_id, generation, error = %e, "Control link failed to open");
                entry.notify_status(LinkStatus::error(e.reason()));
            }
        }
    }

    fn handle_link_event(&mut self, tab_id: TabId, generation: u64, event: LinkEvent) {
        let Some(entry) = self.registry.get_mut(tab_id) else {
            return;
        };
        if entry.link_generation() != generation {
            trace!(%tab_id, generation, "Ignoring event from stale link");
            return;
        }

        match event {
            LinkEvent::Message(data) => {
                if !entry.notify(SupervisorMessage::LinkMessage { data }) {
                    warn!(%tab_id, "No executor attached, dropping controller frame");
                }
            }
            LinkEvent::Closed { was_clean } => {
                entry.mark_closed();
                info!(%tab_id, was_clean, "Control link closed");
                entry.notify_status(LinkStatus::Disconnected { was_clean });
            }
            LinkEvent::Error(reason) => {
                entry.mark_closed();
                warn!(%tab_id, %reason, "Control link error");
                entry.notify_status(LinkStatus::error(reason));
            }
        }
    }
}

// ============================================================================
// Capture Handling
// ============================================================================

impl Supervisor {
    fn start_capture(&self, tab_id: TabId, target: TabId, request_id: RequestId) {
        debug!(%tab_id, %target, %request_id, "Capture requested");

        let capture = Arc::clone(&self.capture);
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let result = capture_tab(capture.as_ref(), target).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(SupervisorEvent::CaptureDone {
                    tab_id,
                    request_id,
                    result,
                });
            }
        });
    }

    fn handle_capture_done(&self, tab_id: TabId, request_id: RequestId, result: Result<String>) {
        let (data_url, error) = match result {
            Ok(data_url) => (Some(data_url), None),
            Err(e) => (None, Some(e.reason())),
        };

        let delivered = self.registry.get(tab_id).is_some_and(|entry| {
            entry.notify(SupervisorMessage::TabCaptureComplete {
                request_id: request_id.clone(),
                data_url,
                error,
            })
        });

        if !delivered {
            warn!(%tab_id, %request_id, "No executor attached, dropping capture result");
        }
    }
}

// ============================================================================
// Tab Lifecycle
// ============================================================================

impl Supervisor {
    async fn handle_tab_removed(&mut self, tab_id: TabId) {
        let Some(mut entry) = self.registry.remove(tab_id) else {
            return;
        };

        entry.release_bridge(DetachReason::TabRemoved);
        if let Some(link) = entry.take_link() {
            link.close(self.options.link_close_timeout).await;
        }

        info!(%tab_id, "Tab removed, connection dropped");
    }

    async fn handle_tab_navigated(&mut self, tab_id: TabId) {
        let close_timeout = self.options.link_close_timeout;
        let Some(entry) = self.registry.get_mut(tab_id) else {
            return;
        };
        if !entry.has_active_link() {
            return;
        }

        if let Some(link) = entry.take_link() {
            link.close(close_timeout).await;
        }

        info!(%tab_id, "Tab navigated, control link closed");
        entry.notify_status(LinkStatus::Disconnected { was_clean: true });
    }

    async fn close_all(&mut self) {
        let close_timeout = self.options.link_close_timeout;

        for (tab_id, mut entry) in self.registry.drain() {
            if let Some(link) = entry.take_link() {
                debug!(%tab_id, "Closing control link");
                link.close(close_timeout).await;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
