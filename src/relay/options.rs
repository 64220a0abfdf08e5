//! Relay configuration.
//!
//! Provides a type-safe set of knobs for the control link endpoint,
//! reconnect backoff and correlation timeouts.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tab_relay::RelayOptions;
//!
//! let options = RelayOptions::new()
//!     .with_host("127.0.0.1")
//!     .with_port(9999)
//!     .with_pending_timeout(Duration::from_secs(60));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ChannelName;

// ============================================================================
// Constants
// ============================================================================

/// Default controller host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default controller port.
pub const DEFAULT_PORT: u16 = 9999;

/// First reconnect delay.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);

/// Upper bound on reconnect delay.
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_millis(10_000);

/// How long a pending correlation may stay unanswered.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a control link to close fully.
pub const DEFAULT_LINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// RelayOptions
// ============================================================================

/// Relay configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Controller host for the control link endpoint.
    pub host: String,

    /// Controller port for the control link endpoint.
    pub port: u16,

    /// Reconnect delay for the first attempt.
    pub reconnect_base: Duration,

    /// Maximum reconnect delay.
    pub reconnect_cap: Duration,

    /// Bound on unanswered pending requests.
    pub pending_timeout: Duration,

    /// Bound on waiting for a link close to complete.
    pub link_close_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            link_close_timeout: DEFAULT_LINK_CLOSE_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayOptions {
    /// Sets the controller host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the controller port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the reconnect backoff base and cap.
    #[inline]
    #[must_use]
    pub fn with_reconnect_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self
    }

    /// Sets the pending request timeout.
    #[inline]
    #[must_use]
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Sets the link close timeout.
    #[inline]
    #[must_use]
    pub fn with_link_close_timeout(mut self, timeout: Duration) -> Self {
        self.link_close_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RelayOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }

        if self.reconnect_base.is_zero() {
            return Err(Error::config("reconnect base delay must be positive"));
        }

        if self.reconnect_cap < self.reconnect_base {
            return Err(Error::config(format!(
                "reconnect cap ({}ms) is below the base delay ({}ms)",
                self.reconnect_cap.as_millis(),
                self.reconnect_base.as_millis()
            )));
        }

        if self.pending_timeout.is_zero() {
            return Err(Error::config("pending timeout must be positive"));
        }

        // Rejects hosts that cannot form a URL.
        self.base_url()?;

        Ok(())
    }
}

// ============================================================================
// Endpoint
// ============================================================================

impl RelayOptions {
    /// Returns the control link endpoint for a channel.
    ///
    /// Format: `ws://{host}:{port}/agents/{channel}/subscribe`, with the
    /// channel percent-encoded as a single path segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host does not form a valid URL.
    pub fn endpoint_url(&self, channel: &ChannelName) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| Error::config("endpoint URL cannot carry a path"))?
            .clear()
            .extend(["agents", channel.as_str(), "subscribe"]);
        Ok(url)
    }

    fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("ws://{}:{}/", self.host.trim(), self.port))
            .map_err(|e| Error::config(format!("invalid endpoint host '{}': {e}", self.host)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RelayOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 9999);
        assert_eq!(options.reconnect_base, Duration::from_millis(1000));
        assert_eq!(options.reconnect_cap, Duration::from_millis(10_000));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url() {
        let options = RelayOptions::new();
        let channel = ChannelName::new("agent-7").expect("valid name");
        assert_eq!(
            options.endpoint_url(&channel).expect("url").as_str(),
            "ws://localhost:9999/agents/agent-7/subscribe"
        );
    }

    #[test]
    fn test_endpoint_url_encodes_channel() {
        let options = RelayOptions::new().with_host("127.0.0.1").with_port(4000);
        let channel = ChannelName::new("a/b c").expect("valid name");
        assert_eq!(
            options.endpoint_url(&channel).expect("url").as_str(),
            "ws://127.0.0.1:4000/agents/a%2Fb%20c/subscribe"
        );
    }

    #[test]
    fn test_validate_rejects_cap_below_base() {
        let options = RelayOptions::new()
            .with_reconnect_backoff(Duration::from_secs(5), Duration::from_secs(1));
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("reconnect cap"));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        assert!(RelayOptions::new().with_host("  ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let options = RelayOptions::new().with_pending_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
