//! Reconnection policy.
//!
//! Pure state machine: it decides whether an automatic reconnect is
//! allowed and how long to wait. Timers are owned by the executor.
//!
//! # Backoff
//!
//! | attempt | delay (base 1s, cap 10s) |
//! |---------|--------------------------|
//! | 1 | 1000 ms |
//! | 2 | 2000 ms |
//! | 3 | 4000 ms |
//! | 4 | 8000 ms |
//! | 5+ | 10000 ms |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::identifiers::ChannelName;
use crate::relay::RelayOptions;

// ============================================================================
// ScheduledReconnect
// ============================================================================

/// A reconnect the policy has allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReconnect {
    /// 1-based attempt number.
    pub attempt: u32,
    /// How long to wait before the attempt.
    pub delay: Duration,
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Backoff and eligibility for automatic reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
    attempts: u32,
    user_disconnect: bool,
    channel: Option<ChannelName>,
}

impl ReconnectPolicy {
    /// Creates a policy with the given backoff base and cap.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempts: 0,
            user_disconnect: false,
            channel: None,
        }
    }

    /// Creates a policy from relay options.
    #[must_use]
    pub fn from_options(options: &RelayOptions) -> Self {
        Self::new(options.reconnect_base, options.reconnect_cap)
    }

    /// Returns the delay for a 1-based attempt number.
    ///
    /// `min(base * 2^(attempt - 1), cap)`; attempt 0 is treated as 1.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Returns the number of automatic attempts since the last reset.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the channel automatic reconnects would target.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Option<&ChannelName> {
        self.channel.as_ref()
    }

    /// Returns `true` if the user disconnected explicitly.
    #[inline]
    #[must_use]
    pub fn is_user_disconnect(&self) -> bool {
        self.user_disconnect
    }
}

// ============================================================================
// Transitions
// ============================================================================

impl ReconnectPolicy {
    /// User asked to connect to `channel`.
    pub fn user_connect(&mut self, channel: ChannelName) {
        self.user_disconnect = false;
        self.attempts = 0;
        self.channel = Some(channel);
    }

    /// User asked to disconnect.
    ///
    /// Returns the channel to close, if one is known.
    pub fn user_disconnect(&mut self) -> Option<ChannelName> {
        self.user_disconnect = true;
        self.attempts = 0;
        self.channel.clone()
    }

    /// The link reached `Open`.
    pub fn on_connected(&mut self) {
        self.user_disconnect = false;
        self.attempts = 0;
    }

    /// The link went down; forgets the channel after a user disconnect.
    pub fn on_link_down(&mut self) {
        if self.user_disconnect {
            self.channel = None;
        }
    }

    /// Consumes one attempt if an automatic reconnect is allowed.
    ///
    /// Allowed only when the user has not disconnected and a channel is
    /// known.
    pub fn next_attempt(&mut self) -> Option<ScheduledReconnect> {
        if self.user_disconnect || self.channel.is_none() {
            return None;
        }

        self.attempts = self.attempts.saturating_add(1);
        Some(ScheduledReconnect {
            attempt: self.attempts,
            delay: self.delay(self.attempts),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(1000), Duration::from_millis(10_000))
    }

    fn channel() -> ChannelName {
        ChannelName::new("alpha").expect("valid name")
    }

    #[test]
    fn test_delay_sequence() {
        let mut policy = policy();
        policy.user_connect(channel());

        let delays: Vec<u64> = (0..5)
            .filter_map(|_| policy.next_attempt())
            .map(|next| next.delay.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000]);
        assert_eq!(policy.attempts(), 5);
    }

    #[test]
    fn test_no_reconnect_without_channel() {
        let mut policy = policy();
        assert!(policy.next_attempt().is_none());
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn test_user_disconnect_suppresses_until_connect() {
        let mut policy = policy();
        policy.user_connect(channel());
        policy.next_attempt();

        assert_eq!(policy.user_disconnect(), Some(channel()));
        assert_eq!(policy.attempts(), 0);
        assert!(policy.next_attempt().is_none());

        policy.on_link_down();
        assert!(policy.channel().is_none());

        policy.user_connect(channel());
        assert!(!policy.is_user_disconnect());
        assert_eq!(policy.next_attempt().map(|n| n.attempt), Some(1));
    }

    #[test]
    fn test_connected_resets_attempts() {
        let mut policy = policy();
        policy.user_connect(channel());
        policy.next_attempt();
        policy.next_attempt();

        policy.on_connected();
        assert_eq!(policy.attempts(), 0);

        // A plain link loss keeps the channel for the next attempt.
        policy.on_link_down();
        assert_eq!(policy.channel(), Some(&channel()));
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        assert_eq!(policy().delay(u32::MAX), Duration::from_millis(10_000));
        assert_eq!(policy().delay(0), Duration::from_millis(1000));
    }

    proptest! {
        #[test]
        fn prop_delay_bounded_and_monotonic(
            base_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            attempt in 1u32..64,
        ) {
            let base = Duration::from_millis(base_ms);
            let cap = Duration::from_millis(base_ms + extra_ms);
            let policy = ReconnectPolicy::new(base, cap);

            let current = policy.delay(attempt);
            let next = policy.delay(attempt + 1);

            prop_assert!(current >= base);
            prop_assert!(current <= cap);
            prop_assert!(next >= current);
        }

        #[test]
        fn prop_delay_doubles_below_cap(base_ms in 1u64..1_000, attempt in 1u32..8) {
            let base = Duration::from_millis(base_ms);
            let policy = ReconnectPolicy::new(base, Duration::from_secs(3600));
            prop_assert_eq!(policy.delay(attempt + 1), policy.delay(attempt) * 2);
        }
    }
}
