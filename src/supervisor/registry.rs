//! Connection registry.
//!
//! Owns one [`TabConnection`] per tab. Only the supervisor event loop
//! touches the registry, so no locking is involved.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                ConnectionRegistry                │
//! │  TabId=1 → { channel, link state, link, bridge } │
//! │  TabId=2 → { channel, link state, link, bridge } │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The bridge reference is a relation, not ownership of the link:
//! dropping it never closes the link, and closing the link never drops it.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::identifiers::{ChannelName, TabId};
use crate::protocol::{DetachReason, LinkStatus, SupervisorMessage};
use crate::transport::ControlLink;

// ============================================================================
// LinkState
// ============================================================================

/// Lifecycle state of a tab's control link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No link was ever requested.
    #[default]
    Absent,
    /// A transport is being opened.
    Connecting,
    /// The link is open.
    Open,
    /// The link was closed or failed.
    Closed,
}

// ============================================================================
// TabSnapshot
// ============================================================================

/// Point-in-time view of a [`TabConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    /// Channel of the current or last link.
    pub channel_name: Option<ChannelName>,
    /// Link state.
    pub link_state: LinkState,
    /// Whether an executor bridge is attached.
    pub bridge_attached: bool,
}

// ============================================================================
// BridgeEndpoint
// ============================================================================

/// Supervisor's reference to an attached bridge.
pub(crate) struct BridgeEndpoint {
    /// Attachment generation, to ignore events from replaced bridges.
    pub generation: u64,
    /// Messages to the executor.
    pub tx: mpsc::UnboundedSender<SupervisorMessage>,
    /// Task forwarding executor messages into the event loop.
    pub forwarder: AbortHandle,
}

impl BridgeEndpoint {
    /// Tells the executor it will not be served again and drops the bridge.
    pub fn release(self, reason: DetachReason) {
        if self.tx.send(SupervisorMessage::detached(reason)).is_err() {
            debug!(generation = self.generation, "Released bridge had no executor");
        }
    }
}

impl Drop for BridgeEndpoint {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

// ============================================================================
// TabConnection
// ============================================================================

/// Per-tab relay state.
#[derive(Default)]
pub struct TabConnection {
    /// Channel of the current or last link.
    channel_name: Option<ChannelName>,
    /// Link lifecycle state.
    link_state: LinkState,
    /// Live link handle (only while `Open`).
    link: Option<ControlLink>,
    /// Generation of the current link attempt; 0 when none is current.
    link_generation: u64,
    /// Attached executor bridge.
    bridge: Option<BridgeEndpoint>,
}

impl TabConnection {
    /// Returns the channel name.
    #[inline]
    #[must_use]
    pub fn channel_name(&self) -> Option<&ChannelName> {
        self.channel_name.as_ref()
    }

    /// Returns the link state.
    #[inline]
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    /// Returns the generation of the current link attempt.
    #[inline]
    #[must_use]
    pub fn link_generation(&self) -> u64 {
        self.link_generation
    }

    /// Returns `true` if a link is open or being opened.
    #[inline]
    #[must_use]
    pub fn has_active_link(&self) -> bool {
        matches!(self.link_state, LinkState::Open | LinkState::Connecting)
    }

    /// Returns `true` if the active link is for `channel`.
    #[inline]
    #[must_use]
    pub fn is_channel(&self, channel: &ChannelName) -> bool {
        self.channel_name.as_ref() == Some(channel)
    }

    /// Returns the link if it is open.
    #[inline]
    #[must_use]
    pub fn open_link(&self) -> Option<&ControlLink> {
        match self.link_state {
            LinkState::Open => self.link.as_ref(),
            _ => None,
        }
    }

    /// Returns a snapshot of this connection.
    #[must_use]
    pub fn snapshot(&self) -> TabSnapshot {
        TabSnapshot {
            channel_name: self.channel_name.clone(),
            link_state: self.link_state,
            bridge_attached: self.bridge.is_some(),
        }
    }

    /// Starts a link attempt for `channel` under `generation`.
    pub(crate) fn begin_connect(&mut self, channel: ChannelName, generation: u64) {
        self.channel_name = Some(channel);
        self.link_state = LinkState::Connecting;
        self.link = None;
        self.link_generation = generation;
    }

    /// Records the opened link.
    pub(crate) fn mark_open(&mut self, link: ControlLink) {
        self.link = Some(link);
        self.link_state = LinkState::Open;
    }

    /// Detaches the current link, invalidating its generation.
    ///
    /// Events still in flight from the returned link are ignored afterwards.
    pub(crate) fn take_link(&mut self) -> Option<ControlLink> {
        self.link_generation = 0;
        if self.link_state != LinkState::Absent {
            self.link_state = LinkState::Closed;
        }
        self.link.take()
    }

    /// Records that the current link closed or failed.
    pub(crate) fn mark_closed(&mut self) {
        self.link = None;
        self.link_state = LinkState::Closed;
        self.link_generation = 0;
    }

    /// Attaches a bridge, returning any bridge it replaces.
    pub(crate) fn attach_bridge(&mut self, bridge: BridgeEndpoint) -> Option<BridgeEndpoint> {
        self.bridge.replace(bridge)
    }

    /// Detaches the bridge if it is still the one with `generation`.
    pub(crate) fn detach_bridge(&mut self, generation: u64) -> bool {
        match &self.bridge {
            Some(bridge) if bridge.generation == generation => {
                self.bridge = None;
                true
            }
            _ => false,
        }
    }

    /// Releases the attached bridge, if any.
    pub(crate) fn release_bridge(&mut self, reason: DetachReason) -> bool {
        match self.bridge.take() {
            Some(bridge) => {
                bridge.release(reason);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `generation` is the attached bridge.
    #[inline]
    pub(crate) fn is_bridge(&self, generation: u64) -> bool {
        self.bridge
            .as_ref()
            .is_some_and(|bridge| bridge.generation == generation)
    }

    /// Sends a message to the attached executor.
    ///
    /// Returns `false` if no executor is attached or it went away.
    pub(crate) fn notify(&self, message: SupervisorMessage) -> bool {
        match &self.bridge {
            Some(bridge) => bridge.tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Sends a status for the current channel to the attached executor.
    pub(crate) fn notify_status(&self, status: LinkStatus) -> bool {
        self.notify(SupervisorMessage::status(status, self.channel_name.clone()))
    }
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Registry of per-tab connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    tabs: FxHashMap<TabId, TabConnection>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `tab_id`, creating it if absent.
    pub fn entry(&mut self, tab_id: TabId) -> &mut TabConnection {
        self.tabs.entry(tab_id).or_insert_with(|| {
            debug!(%tab_id, "TabConnection created");
            TabConnection::default()
        })
    }

    /// Returns the connection for `tab_id`.
    #[inline]
    #[must_use]
    pub fn get(&self, tab_id: TabId) -> Option<&TabConnection> {
        self.tabs.get(&tab_id)
    }

    /// Returns the connection for `tab_id` mutably.
    #[inline]
    pub fn get_mut(&mut self, tab_id: TabId) -> Option<&mut TabConnection> {
        self.tabs.get_mut(&tab_id)
    }

    /// Removes and returns the connection for `tab_id`.
    #[inline]
    pub fn remove(&mut self, tab_id: TabId) -> Option<TabConnection> {
        self.tabs.remove(&tab_id)
    }

    /// Removes every connection.
    pub fn drain(&mut self) -> Vec<(TabId, TabConnection)> {
        self.tabs.drain().collect()
    }

    /// Returns the number of tracked tabs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Returns `true` if no tabs are tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Returns the number of open links across all tabs.
    #[must_use]
    pub fn open_link_count(&self) -> usize {
        self.tabs
            .values()
            .filter(|tab| tab.open_link().is_some())
            .count()
    }
}

// ============================================================================
// Tests
// ============================================================================
