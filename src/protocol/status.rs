//! Control link status reports.
//!
//! The supervisor reports every transition of a tab's control link to the
//! attached executor. Transport errors and closes share this single path.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// LinkStatus
// ============================================================================

/// Status of a tab's control link as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum LinkStatus {
    /// Link is open.
    Connected,

    /// Link closed.
    Disconnected {
        /// Whether the close handshake completed.
        #[serde(rename = "wasClean")]
        was_clean: bool,
    },

    /// Link failed to open or errored while open.
    Error {
        /// Transport failure reason.
        reason: String,
    },

    /// Disconnect named a channel that is not the active one.
    #[serde(rename = "Not Connected or different connection")]
    NotConnected,
}

impl LinkStatus {
    /// Creates an error status.
    #[inline]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Returns `true` for the statuses that make an automatic reconnect eligible.
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Error { .. })
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("Connected"),
            Self::Disconnected { .. } => f.write_str("Disconnected"),
            Self::Error { reason } => write!(f, "Error: {reason}"),
            Self::NotConnected => f.write_str("Not Connected or different connection"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(LinkStatus::Connected.to_string(), "Connected");
        assert_eq!(
            LinkStatus::error("Connection failed").to_string(),
            "Error: Connection failed"
        );
        assert_eq!(
            LinkStatus::NotConnected.to_string(),
            "Not Connected or different connection"
        );
    }

    #[test]
    fn test_is_failure() {
        assert!(LinkStatus::Disconnected { was_clean: true }.is_failure());
        assert!(LinkStatus::error("x").is_failure());
        assert!(!LinkStatus::Connected.is_failure());
        assert!(!LinkStatus::NotConnected.is_failure());
    }
}
