//! Error types for the tab relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use tab_relay::{Result, Error};
//!
//! async fn example(supervisor: &SupervisorHandle, tab: TabId) -> Result<()> {
//!     let port = supervisor.attach(tab)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | Bridge | [`Error::ChannelDetached`], [`Error::SupervisorGone`] |
//! | Commands | [`Error::MalformedCommand`], [`Error::DuplicateRequest`] |
//! | Execution | [`Error::ScriptError`], [`Error::CaptureFailed`], [`Error::RequestTimeout`] |
//! | Imaging | [`Error::DataUrl`], [`Error::Image`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, TabId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Control link could not be opened or written to.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Control link closed while an operation was using it.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Bridge Errors
    // ========================================================================
    /// The bridge channel between supervisor and executor went away.
    #[error("Channel disconnected: {reason}")]
    ChannelDetached {
        /// Why the channel detached.
        reason: String,
    },

    /// The supervisor event loop is no longer running.
    #[error("Supervisor is not running")]
    SupervisorGone,

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Inbound command is missing required fields.
    #[error("Malformed {command} command: {message}")]
    MalformedCommand {
        /// Command type as received.
        command: String,
        /// What is wrong with it.
        message: String,
    },

    /// A request with the same id is already in flight.
    #[error("Request {request_id} is already in flight")]
    DuplicateRequest {
        /// The duplicated request id.
        request_id: RequestId,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// In-page script raised an exception.
    #[error("Script error: {message}")]
    ScriptError {
        /// Exception description from the page.
        message: String,
    },

    /// Visible-surface capture failed.
    #[error("Capture failed for tab {tab_id}: {message}")]
    CaptureFailed {
        /// Tab whose surface was requested.
        tab_id: TabId,
        /// Failure reason reported by the host.
        message: String,
    },

    /// Pending request was not answered in time.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Imaging Errors
    // ========================================================================
    /// Data URL could not be parsed.
    #[error("Invalid data URL: {message}")]
    DataUrl {
        /// Why the data URL was rejected.
        message: String,
    },

    /// Image decode/encode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a channel detached error.
    #[inline]
    pub fn channel_detached(reason: impl Into<String>) -> Self {
        Self::ChannelDetached {
            reason: reason.into(),
        }
    }

    /// Creates a malformed command error.
    #[inline]
    pub fn malformed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate request error.
    #[inline]
    pub fn duplicate_request(request_id: RequestId) -> Self {
        Self::DuplicateRequest { request_id }
    }

    /// Creates a script error.
    #[inline]
    pub fn script_error(message: impl Into<String>) -> Self {
        Self::ScriptError {
            message: message.into(),
        }
    }

    /// Creates a capture failure.
    #[inline]
    pub fn capture_failed(tab_id: TabId, message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            tab_id,
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a data URL error.
    #[inline]
    pub fn data_url(message: impl Into<String>) -> Self {
        Self::DataUrl {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a control link error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the bridge or supervisor went away.
    #[inline]
    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::ChannelDetached { .. } | Self::SupervisorGone)
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are eligible for an automatic reconnect or retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error() || self.is_timeout()
    }

    /// Returns the message text without the category prefix.
    ///
    /// Used when an error is reported back to the controller inside a
    /// result frame.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Config { message }
            | Self::InvalidArgument { message }
            | Self::Connection { message }
            | Self::ScriptError { message }
            | Self::CaptureFailed { message, .. }
            | Self::DataUrl { message }
            | Self::MalformedCommand { message, .. } => message.clone(),
            Self::ChannelDetached { reason } => format!("Channel disconnected: {reason}"),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("reconnect cap below base");
        assert_eq!(
            err.to_string(),
            "Configuration error: reconnect cap below base"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::new("r1"), 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
        assert_eq!(timeout_err.to_string(), "Request r1 timed out after 5000ms");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_detached() {
        assert!(Error::channel_detached("panel closed").is_detached());
        assert!(Error::SupervisorGone.is_detached());
        assert!(!Error::ConnectionClosed.is_detached());
    }

    #[test]
    fn test_reason_strips_prefix() {
        let tab = TabId::new(3).expect("valid tab id");
        let err = Error::capture_failed(tab, "No window");
        assert_eq!(err.reason(), "No window");
        assert_eq!(err.to_string(), "Capture failed for tab 3: No window");

        let err = Error::channel_detached("port closed");
        assert_eq!(err.reason(), "Channel disconnected: port closed");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::malformed("EVALUATE_SCRIPT", "no script").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
