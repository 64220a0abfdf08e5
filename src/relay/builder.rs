//! Builder pattern for relay configuration.
//!
//! Provides a fluent API for configuring and creating [`Relay`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tab_relay::Relay;
//!
//! let relay = Relay::builder()
//!     .host("127.0.0.1")
//!     .port(9999)
//!     .capture(Arc::new(my_capture))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::supervisor::SurfaceCapture;
use crate::transport::{LinkConnector, WsConnector};

use super::core::Relay;
use super::options::RelayOptions;

// ============================================================================
// RelayBuilder
// ============================================================================

/// Builder for configuring a [`Relay`] instance.
///
/// Use [`Relay::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct RelayBuilder {
    /// Endpoint, backoff and timeouts.
    options: RelayOptions,
    /// Opens control links. Defaults to [`WsConnector`].
    connector: Option<Arc<dyn LinkConnector>>,
    /// Host capture capability. Required.
    capture: Option<Arc<dyn SurfaceCapture>>,
}

impl fmt::Debug for RelayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayBuilder")
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .field("capture", &self.capture.is_some())
            .finish()
    }
}

// ============================================================================
// RelayBuilder Implementation
// ============================================================================

impl RelayBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the controller host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options = self.options.with_host(host);
        self
    }

    /// Sets the controller port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options = self.options.with_port(port);
        self
    }

    /// Sets the reconnect backoff base and cap.
    #[inline]
    #[must_use]
    pub fn reconnect_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.options = self.options.with_reconnect_backoff(base, cap);
        self
    }

    /// Sets how long a request may stay unanswered.
    #[inline]
    #[must_use]
    pub fn pending_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_pending_timeout(timeout);
        self
    }

    /// Replaces the control link connector.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn LinkConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the surface capture capability.
    #[inline]
    #[must_use]
    pub fn capture(mut self, capture: Arc<dyn SurfaceCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Validates the configuration and starts the supervisor.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if no capture capability was set
    pub fn build(self) -> Result<Relay> {
        self.options.validate()?;

        let capture = self.capture.ok_or_else(|| {
            Error::config(
                "Surface capture is required. Use .capture() to set it.\n\
                 Example: Relay::builder().capture(Arc::new(my_capture))",
            )
        })?;
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));

        Ok(Relay::start(self.options, connector, capture))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::identifiers::{TabId, WindowId};

    struct NoCapture;

    #[async_trait]
    impl SurfaceCapture for NoCapture {
        async fn window_of(&self, _tab_id: TabId) -> Result<WindowId> {
            Err(Error::invalid_argument("no windows"))
        }

        async fn capture_visible(&self, _window_id: WindowId) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_new_uses_default_options() {
        let builder = RelayBuilder::new();
        assert_eq!(builder.options, RelayOptions::default());
        assert!(builder.connector.is_none());
        assert!(builder.capture.is_none());
    }

    #[test]
    fn test_setters_update_options() {
        let builder = RelayBuilder::new()
            .host("127.0.0.1")
            .port(4000)
            .pending_timeout(Duration::from_secs(5))
            .reconnect_backoff(Duration::from_millis(10), Duration::from_millis(80));

        assert_eq!(builder.options.host, "127.0.0.1");
        assert_eq!(builder.options.port, 4000);
        assert_eq!(builder.options.pending_timeout, Duration::from_secs(5));
        assert_eq!(builder.options.reconnect_cap, Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_build_fails_without_capture() {
        let err = RelayBuilder::new().build().expect_err("capture missing");
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("capture"));
    }

    #[tokio::test]
    async fn test_build_fails_with_invalid_options() {
        let err = RelayBuilder::new()
            .host("  ")
            .capture(Arc::new(NoCapture))
            .build()
            .expect_err("blank host");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_starts_supervisor() {
        let relay = RelayBuilder::new()
            .capture(Arc::new(NoCapture))
            .build()
            .expect("valid configuration");
        assert!(relay.supervisor().is_running());
        relay.shutdown().await;
        assert!(!relay.supervisor().is_running());
    }
}
