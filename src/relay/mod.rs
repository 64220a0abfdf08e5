//! Relay entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Relay`] | Owns the supervisor, spawns executors |
//! | [`RelayBuilder`] | Fluent configuration builder |
//! | [`RelayOptions`] | Endpoint, backoff and timeouts |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for relay configuration.
pub mod builder;

/// Core relay implementation.
pub mod core;

/// Relay options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Relay;
pub use builder::RelayBuilder;
pub use options::RelayOptions;
