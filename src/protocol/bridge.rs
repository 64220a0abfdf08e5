//! Supervisor ⇄ executor bridge messages.
//!
//! These travel over the per-tab bridge channel and never reach the
//! controller directly.
//!
//! # Executor → Supervisor
//!
//! | type | fields |
//! |------|--------|
//! | `CONNECT_LINK` | `channelName` |
//! | `DISCONNECT_LINK` | `channelName` |
//! | `FORWARD_TO_LINK` | `payload` |
//! | `REQUEST_TAB_CAPTURE` | `tabId`, `requestId` |
//!
//! # Supervisor → Executor
//!
//! | type | fields |
//! |------|--------|
//! | `LINK_STATUS` | `status`, `channelName` |
//! | `LINK_MESSAGE` | `data` |
//! | `TAB_CAPTURE_COMPLETE` | `requestId`, `dataUrl`, `error` |
//! | `BRIDGE_DETACHED` | `reason` |
//!
//! `BRIDGE_DETACHED` is always the last message on a bridge. An executor
//! that receives it stops instead of attaching again.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{ChannelName, RequestId, TabId};

use super::status::LinkStatus;

// ============================================================================
// ExecutorMessage
// ============================================================================

/// Message from the executor to its supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorMessage {
    /// Open (or confirm) the control link for a channel.
    ConnectLink {
        /// Channel to subscribe to.
        #[serde(rename = "channelName")]
        channel_name: ChannelName,
    },

    /// Close the control link if it is for this channel.
    DisconnectLink {
        /// Channel to unsubscribe from.
        #[serde(rename = "channelName")]
        channel_name: ChannelName,
    },

    /// Send a payload to the controller.
    ForwardToLink {
        /// JSON payload, serialized by the supervisor.
        payload: Value,
    },

    /// Rasterize the visible surface of a tab.
    RequestTabCapture {
        /// Tab to capture.
        #[serde(rename = "tabId")]
        tab_id: TabId,
        /// Correlation id of the screenshot request.
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
}

// ============================================================================
// SupervisorMessage
// ============================================================================

/// Message from the supervisor to its executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorMessage {
    /// Control link status change.
    LinkStatus {
        /// New status.
        status: LinkStatus,
        /// Channel the status refers to.
        #[serde(rename = "channelName")]
        channel_name: Option<ChannelName>,
    },

    /// Frame received from the controller.
    ///
    /// Non-JSON text frames are delivered as a JSON string.
    LinkMessage {
        /// Parsed frame.
        data: Value,
    },

    /// Answer to [`ExecutorMessage::RequestTabCapture`].
    TabCaptureComplete {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// PNG data URL of the visible surface.
        #[serde(rename = "dataUrl")]
        data_url: Option<String>,
        /// Failure reason.
        error: Option<String>,
    },

    /// The supervisor released this bridge for good.
    BridgeDetached {
        /// Why the bridge was released.
        reason: DetachReason,
    },
}

impl SupervisorMessage {
    /// Creates a status message.
    #[inline]
    #[must_use]
    pub fn status(status: LinkStatus, channel_name: Option<ChannelName>) -> Self {
        Self::LinkStatus {
            status,
            channel_name,
        }
    }

    /// Creates the final message of a released bridge.
    #[inline]
    #[must_use]
    pub fn detached(reason: DetachReason) -> Self {
        Self::BridgeDetached { reason }
    }
}

// ============================================================================
// DetachReason
// ============================================================================

/// Why the supervisor released a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetachReason {
    /// The tab was closed.
    TabRemoved,
    /// Another executor attached to the same tab.
    Replaced,
}

impl fmt::Display for DetachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TabRemoved => f.write_str("tab closed"),
            Self::Replaced => f.write_str("replaced by another executor"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_executor_message_shape() {
        let message = ExecutorMessage::RequestTabCapture {
            tab_id: TabId::new(5).expect("valid tab id"),
            request_id: RequestId::new("r3"),
        };
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({"type": "REQUEST_TAB_CAPTURE", "tabId": 5, "requestId": "r3"})
        );
    }

    #[test]
    fn test_status_message_shape() {
        let message = SupervisorMessage::status(
            LinkStatus::Disconnected { was_clean: false },
            ChannelName::new("alpha"),
        );
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({
                "type": "LINK_STATUS",
                "status": {"status": "Disconnected", "wasClean": false},
                "channelName": "alpha"
            })
        );
    }

    #[test]
    fn test_capture_complete_roundtrip() {
        let wire = json!({
            "type": "TAB_CAPTURE_COMPLETE",
            "requestId": "r3",
            "dataUrl": null,
            "error": "No window"
        });
        let message: SupervisorMessage = serde_json::from_value(wire).expect("parse");
        assert!(matches!(
            message,
            SupervisorMessage::TabCaptureComplete { error: Some(_), data_url: None, .. }
        ));
    }

    #[test]
    fn test_detached_message_shape() {
        let message = SupervisorMessage::detached(DetachReason::TabRemoved);
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({"type": "BRIDGE_DETACHED", "reason": "TAB_REMOVED"})
        );
        assert_eq!(DetachReason::Replaced.to_string(), "replaced by another executor");
    }
}
