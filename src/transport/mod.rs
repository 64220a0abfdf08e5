//! Transport layer.
//!
//! Two kinds of channel carry relay traffic:
//!
//! ```text
//! ┌────────────┐  control link   ┌────────────┐  bridge channel  ┌────────────┐
//! │ Controller │◄───────────────►│ Supervisor │◄────────────────►│  Executor  │
//! │ (external) │  one per tab    │            │   one per tab    │  (in-page) │
//! └────────────┘                 └────────────┘                  └────────────┘
//!
//! Control link endpoint: ws://<host>:<port>/agents/<channelName>/subscribe
//! ```
//!
//! The two lifecycles are independent: a bridge can detach while its
//! control link stays open, and a link can close while the bridge stays
//! attached.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `link` | Control link handle, event loop, connector trait |
//! | `bridge` | Bridge channel pair |

// ============================================================================
// Submodules
// ============================================================================

/// Supervisor ⇄ executor bridge channel.
pub mod bridge;

/// Control link to the controller.
pub mod link;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{BridgeChannel, BridgeSender, ExecutorPort, SupervisorEnd};
pub use link::{ControlLink, LinkCommand, LinkConnector, LinkEvent, WsConnector};
