//! Connection supervisor.
//!
//! Process-wide, single instance. Owns every control link and every
//! bridge, keyed by tab.
//!
//! # Responsibilities
//!
//! | Input | Effect |
//! |-------|--------|
//! | `CONNECT_LINK` | Open, reuse or replace the tab's link |
//! | `DISCONNECT_LINK` | Close the link if the channel matches |
//! | `FORWARD_TO_LINK` | Write the payload to the open link |
//! | `REQUEST_TAB_CAPTURE` | Capture the visible surface |
//! | Link frame | Deliver to the attached executor |
//! | Tab navigated | Close the link, keep the bridge |
//! | Tab removed | Close the link, drop the entry |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tab_relay::{RelayOptions, Supervisor, WsConnector};
//!
//! let supervisor = Supervisor::spawn(RelayOptions::new(), Arc::new(WsConnector), capture);
//! let port = supervisor.attach(tab_id)?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Surface capture capability.
pub mod capture;

/// Supervisor event loop and handle.
pub mod core;

/// Per-tab connection state.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Supervisor, SupervisorHandle};
pub use capture::SurfaceCapture;
pub use registry::{ConnectionRegistry, LinkState, TabConnection, TabSnapshot};
