//! Session status reported by an executor.

use std::fmt;
use std::time::Duration;

use crate::identifiers::ChannelName;
use crate::protocol::DetachReason;

// ============================================================================
// SessionStatus
// ============================================================================

/// Connection status of an executor session, as a user would see it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// User-initiated connect in progress.
    Connecting,
    /// Automatic reconnect in progress.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Control link open.
    Connected {
        /// Channel the link is subscribed to.
        channel: ChannelName,
    },
    /// Waiting for the reconnect timer.
    WaitingToReconnect {
        /// Attempt that will run when the timer fires.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Control link closed.
    Disconnected,
    /// Control link failed.
    Error(String),
    /// Bridge to the supervisor went away.
    BridgeLost,
    /// The supervisor released this executor; it has stopped.
    Detached(DetachReason),
}

impl SessionStatus {
    /// Returns `true` if the control link is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` once the executor can no longer change status.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Detached(_))
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Connecting => f.write_str("Connecting..."),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting... (Attempt {attempt})"),
            Self::Connected { channel } => write!(f, "Connected ({channel})"),
            Self::WaitingToReconnect { attempt, delay } => write!(
                f,
                "Disconnected. Reconnecting in {}s... (Attempt {attempt})",
                (delay.as_millis() as f64 / 1000.0).round()
            ),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
            Self::BridgeLost => f.write_str("Disconnected from supervisor"),
            Self::Detached(reason) => write!(f, "Detached: {reason}"),
        }
    }
}

// ============================================================================
// ExecutorState
// ============================================================================

/// Point-in-time view of an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorState {
    /// Automatic reconnect attempts since the last reset.
    pub attempts: u32,
    /// Channel automatic reconnects would target.
    pub channel: Option<ChannelName>,
    /// Requests in flight.
    pub pending: usize,
    /// Age of the oldest request in flight.
    pub oldest_pending: Option<Duration>,
    /// Whether a bridge is attached.
    pub bridge_attached: bool,
    /// Whether a reconnect timer is armed.
    pub reconnect_scheduled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let waiting = SessionStatus::WaitingToReconnect {
            attempt: 3,
            delay: Duration::from_millis(4000),
        };
        assert_eq!(waiting.to_string(), "Disconnected. Reconnecting in 4s... (Attempt 3)");
        assert_eq!(
            SessionStatus::Error("connection refused".to_string()).to_string(),
            "Error: connection refused"
        );
        assert!(!SessionStatus::Idle.is_connected());

        let detached = SessionStatus::Detached(DetachReason::TabRemoved);
        assert_eq!(detached.to_string(), "Detached: tab closed");
        assert!(detached.is_terminal());
        assert!(!SessionStatus::BridgeLost.is_terminal());
    }
}
