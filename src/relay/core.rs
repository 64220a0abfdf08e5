//! Relay coordinator.
//!
//! A [`Relay`] owns the process-wide supervisor and spawns one executor per
//! inspected tab.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::executor::{Executor, ExecutorHandle, ScriptEvaluator};
use crate::identifiers::TabId;
use crate::supervisor::{Supervisor, SupervisorHandle, SurfaceCapture};
use crate::transport::LinkConnector;

use super::builder::RelayBuilder;
use super::options::RelayOptions;

// ============================================================================
// Relay
// ============================================================================

/// Automation relay: one supervisor, any number of tab executors.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tab_relay::Relay;
///
/// let relay = Relay::builder().capture(Arc::new(capture)).build()?;
/// let executor = relay.attach_executor(tab_id, Arc::new(evaluator))?;
/// executor.connect("my-channel")?;
/// ```
#[derive(Clone)]
pub struct Relay {
    options: RelayOptions,
    supervisor: SupervisorHandle,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("options", &self.options)
            .field("running", &self.supervisor.is_running())
            .finish()
    }
}

// ============================================================================
// Relay - Public API
// ============================================================================

impl Relay {
    /// Creates a configuration builder for the relay.
    #[inline]
    #[must_use]
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    /// Returns the supervisor handle.
    #[inline]
    #[must_use]
    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Returns the relay options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Attaches a bridge for `tab_id` and spawns its executor.
    ///
    /// Replaces any bridge the tab already had. The previous executor is
    /// told it was replaced and stops with
    /// [`SessionStatus::Detached`](crate::SessionStatus::Detached); the
    /// tab's control link stays open for the new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorGone`](crate::Error::SupervisorGone) after
    /// [`shutdown`](Self::shutdown).
    pub fn attach_executor(
        &self,
        tab_id: TabId,
        evaluator: Arc<dyn ScriptEvaluator>,
    ) -> Result<ExecutorHandle> {
        let port = self.supervisor.attach(tab_id)?;
        info!(%tab_id, "Executor attached");
        Ok(Executor::spawn(
            port,
            self.supervisor.clone(),
            evaluator,
            &self.options,
        ))
    }

    /// Closes every control link and stops the supervisor.
    pub async fn shutdown(&self) {
        info!("Shutting down relay");
        self.supervisor.shutdown().await;
    }
}

// ============================================================================
// Relay - Internal
// ============================================================================

impl Relay {
    pub(crate) fn start(
        options: RelayOptions,
        connector: Arc<dyn LinkConnector>,
        capture: Arc<dyn SurfaceCapture>,
    ) -> Self {
        let supervisor = Supervisor::spawn(options.clone(), connector, capture);
        info!(host = %options.host, port = options.port, "Relay started");
        Self {
            options,
            supervisor,
        }
    }
}
