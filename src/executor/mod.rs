//! In-page command executor.
//!
//! One executor runs per inspected tab. It receives commands that the
//! controller sent over the control link, runs them against the page and
//! sends the results back through the supervisor.
//!
//! # Commands
//!
//! | Command | Result | Needs supervisor |
//! |---------|--------|------------------|
//! | `EVALUATE_SCRIPT` | `EVALUATION_RESULT` | No |
//! | `CAPTURE_ELEMENTS_SCREENSHOT` | `ELEMENTS_SCREENSHOT_RESULT` | Yes, for the surface capture |
//! | `PASTE_DATA` | `PASTE_RESULT` | No |
//!
//! # Session
//!
//! The executor also drives its tab's session: user connect and
//! disconnect, plus automatic reconnects with exponential backoff
//! (`min(base * 2^(n-1), cap)`) after unexpected link loss.
//!
//! # Example
//!
//! ```ignore
//! use tab_relay::Executor;
//!
//! let port = supervisor.attach(tab_id)?;
//! let executor = Executor::spawn(port, supervisor.clone(), evaluator, &options);
//! executor.connect("my-channel")?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Executor event loop and handle.
pub mod core;

/// Per-command tasks.
mod dispatch;

/// `PASTE_DATA` script.
mod paste;

/// Correlation table for in-flight requests.
pub mod pending;

/// Reconnect backoff policy.
pub mod reconnect;

/// Screenshot measurement and cropping.
pub mod screenshot;

/// Script evaluation capability.
pub mod script;

/// Session status.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Executor, ExecutorHandle};
pub use pending::{PendingKind, PendingRequests};
pub use reconnect::{ReconnectPolicy, ScheduledReconnect};
pub use screenshot::{ElementRect, Measurements};
pub use script::{Evaluation, ScriptEvaluator};
pub use session::{ExecutorState, SessionStatus};
