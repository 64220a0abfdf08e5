//! Per-tab bridge channel.
//!
//! A duplex message channel between the supervisor and the in-page
//! command executor of one tab. Its lifetime is independent of the
//! control link: either end can go away without closing the link.
//!
//! Detachment is observed as the peer's receiver returning `None`.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{ExecutorMessage, SupervisorMessage};

// ============================================================================
// BridgeChannel
// ============================================================================

/// Factory for bridge channel pairs.
pub struct BridgeChannel;

impl BridgeChannel {
    /// Creates a connected pair of bridge endpoints for `tab_id`.
    #[must_use]
    pub fn pair(tab_id: TabId) -> (SupervisorEnd, ExecutorPort) {
        let (to_executor_tx, to_executor_rx) = mpsc::unbounded_channel();
        let (to_supervisor_tx, to_supervisor_rx) = mpsc::unbounded_channel();

        let supervisor_end = SupervisorEnd {
            tx: to_executor_tx,
            rx: to_supervisor_rx,
        };
        let executor_port = ExecutorPort {
            sender: BridgeSender {
                tab_id,
                tx: to_supervisor_tx,
            },
            rx: to_executor_rx,
        };

        (supervisor_end, executor_port)
    }
}

// ============================================================================
// SupervisorEnd
// ============================================================================

/// Supervisor side of a bridge channel.
pub struct SupervisorEnd {
    /// Messages to the executor.
    pub tx: mpsc::UnboundedSender<SupervisorMessage>,
    /// Messages from the executor.
    pub rx: mpsc::UnboundedReceiver<ExecutorMessage>,
}

// ============================================================================
// ExecutorPort
// ============================================================================

/// Executor side of a bridge channel.
pub struct ExecutorPort {
    sender: BridgeSender,
    rx: mpsc::UnboundedReceiver<SupervisorMessage>,
}

impl ExecutorPort {
    /// Returns the tab this port is attached to.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.sender.tab_id
    }

    /// Splits into the cloneable sender and the inbound receiver.
    #[must_use]
    pub fn split(self) -> (BridgeSender, mpsc::UnboundedReceiver<SupervisorMessage>) {
        (self.sender, self.rx)
    }
}

// ============================================================================
// BridgeSender
// ============================================================================

/// Cloneable sending half of an executor port.
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tab_id: TabId,
    tx: mpsc::UnboundedSender<ExecutorMessage>,
}

impl BridgeSender {
    /// Returns the tab this sender is attached to.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Posts a message to the supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelDetached`] if the supervisor end is gone.
    pub fn post(&self, message: ExecutorMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::channel_detached("supervisor end of the bridge is closed"))
    }

    /// Returns `true` if the supervisor end is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::ChannelName;

    fn tab() -> TabId {
        TabId::new(1).expect("valid tab id")
    }

    #[tokio::test]
    async fn test_pair_is_duplex() {
        let (mut supervisor_end, port) = BridgeChannel::pair(tab());
        let (sender, mut inbound) = port.split();

        let channel_name = ChannelName::new("alpha").expect("valid name");
        sender
            .post(ExecutorMessage::ConnectLink {
                channel_name: channel_name.clone(),
            })
            .expect("post");
        assert_eq!(
            supervisor_end.rx.recv().await,
            Some(ExecutorMessage::ConnectLink { channel_name })
        );

        supervisor_end
            .tx
            .send(SupervisorMessage::LinkMessage {
                data: serde_json::json!(1),
            })
            .expect("send");
        assert!(inbound.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dropping_supervisor_end_detaches() {
        let (supervisor_end, port) = BridgeChannel::pair(tab());
        let (sender, mut inbound) = port.split();
        drop(supervisor_end);

        assert!(sender.is_closed());
        assert!(inbound.recv().await.is_none());
        let err = sender
            .post(ExecutorMessage::ForwardToLink {
                payload: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(err.is_detached());
    }
}
