//! Tab Relay - Automation relay between a remote controller and a live tab.
//!
//! A remote controller drives a browser tab over a WebSocket control link.
//! The relay carries its commands into the page and the results back out.
//!
//! # Architecture
//!
//! Three hops, two independent channels:
//!
//! ```text
//! ┌────────────┐  control link   ┌────────────┐  bridge channel  ┌────────────┐
//! │ Controller │◄───────────────►│ Supervisor │◄────────────────►│  Executor  │
//! │ (external) │   WebSocket     │ (1 / proc) │    in-process    │ (1 / tab)  │
//! └────────────┘                 └────────────┘                  └────────────┘
//! ```
//!
//! - **Supervisor**: owns every control link, keyed by tab; performs
//!   surface captures on behalf of executors
//! - **Executor**: runs commands in the page, crops screenshots and
//!   manages its session with automatic reconnect
//!
//! Key design principles:
//!
//! - Controller frames are correlated by `requestId`, never by order
//! - A tab has at most one live control link
//! - Link and bridge lifecycles are independent
//! - Page and browser access go through host capability traits
//!   ([`ScriptEvaluator`], [`SurfaceCapture`])
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tab_relay::{Relay, Result, TabId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let relay = Relay::builder()
//!         .host("localhost")
//!         .port(9999)
//!         .capture(Arc::new(my_capture))
//!         .build()?;
//!
//!     let tab = TabId::new(7).expect("positive tab id");
//!     let executor = relay.attach_executor(tab, Arc::new(my_evaluator))?;
//!     executor.connect("my-channel")?;
//!
//!     let status = executor.wait_for(|s| s.is_connected()).await?;
//!     println!("{status}");
//!
//!     relay.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`relay`] | Entry point: [`Relay`], [`RelayBuilder`], [`RelayOptions`] |
//! | [`supervisor`] | Link owner and capture service |
//! | [`executor`] | In-page command runner and session |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire and bridge message types |
//! | [`transport`] | Control link and bridge channel |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// In-page command executor.
///
/// - [`Executor`] - Per-tab event loop
/// - [`ExecutorHandle`] - Connect, disconnect, status
/// - [`ScriptEvaluator`] - Host capability to run page script
pub mod executor;

/// Type-safe identifiers for relay entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Relay protocol message types.
pub mod protocol;

/// Relay entry point and configuration.
///
/// Use [`Relay::builder()`] to create a configured relay.
pub mod relay;

/// Connection supervisor.
///
/// - [`Supervisor`] - Process-wide event loop
/// - [`SupervisorHandle`] - Attach bridges, report tab lifecycle
/// - [`SurfaceCapture`] - Host capability to capture a window
pub mod supervisor;

/// Control link and bridge channel.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Relay types
pub use relay::{Relay, RelayBuilder, RelayOptions};

// Supervisor types
pub use supervisor::{LinkState, Supervisor, SupervisorHandle, SurfaceCapture, TabSnapshot};

// Executor types
pub use executor::{
    Evaluation, Executor, ExecutorHandle, ExecutorState, ScriptEvaluator, SessionStatus,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ChannelName, RequestId, TabId, WindowId};

// Protocol types
pub use protocol::{
    Command, CommandKind, CommandResult, DataUrl, DetachReason, ExecutorMessage, ImageData,
    LinkStatus, SupervisorMessage,
};

// Transport types
pub use transport::{ControlLink, LinkCommand, LinkConnector, LinkEvent, WsConnector};
