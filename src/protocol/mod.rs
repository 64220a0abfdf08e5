//! Relay protocol message types.
//!
//! This module defines every frame that moves through the three hops of
//! the relay.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Command`] | Controller → Executor | Work to perform in the page |
//! | [`CommandResult`] | Executor → Controller | Correlated outcome |
//! | [`ExecutorMessage`] | Executor → Supervisor | Link control, forwarding, capture |
//! | [`SupervisorMessage`] | Supervisor → Executor | Link status, inbound frames, capture |
//!
//! Controller frames are JSON objects discriminated by `type` and
//! correlated by `requestId`, never by arrival order.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Inbound command frames and validation |
//! | `result` | Outbound result frames |
//! | `bridge` | Supervisor ⇄ executor messages |
//! | `status` | Control link status reports |
//! | `data_url` | `data:` URL parsing and encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Supervisor ⇄ executor bridge messages.
pub mod bridge;

/// Inbound command frames.
pub mod command;

/// `data:` URL helpers.
pub mod data_url;

/// Outbound result frames.
pub mod result;

/// Control link status.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{DetachReason, ExecutorMessage, SupervisorMessage};
pub use command::{Command, CommandKind, Inbound, MalformedCommand};
pub use data_url::DataUrl;
pub use result::{CommandResult, ImageData};
pub use status::LinkStatus;
