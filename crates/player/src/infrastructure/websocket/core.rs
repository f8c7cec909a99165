//! Platform-agnostic reconnection math for the game socket.
//!
//! No runtime dependencies here; the transport owns the timer
//! and asks [`BackoffState`] how long to wait.

use std::time::Duration;

use super::shared::{BACKOFF_MULTIPLIER, DEFAULT_RECONNECT_DELAY_MS, MAX_RETRY_DELAY_MS};

/// How long to wait before reopening a socket that closed unexpectedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay every time
    Fixed { delay_ms: u64 },
    /// Doubles per failed attempt up to `max_delay_ms`; resets once a socket opens
    Exponential { base_delay_ms: u64, max_delay_ms: u64 },
}

impl ReconnectPolicy {
    pub fn exponential(base_delay_ms: u64) -> Self {
        Self::Exponential {
            base_delay_ms,
            max_delay_ms: MAX_RETRY_DELAY_MS,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

/// Backoff state shared by reconnect logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffState {
    attempts: u32,
}

impl BackoffState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Advance to the next attempt and return the delay to wait *before* it.
    pub fn next_delay_and_advance(&mut self, policy: &ReconnectPolicy) -> Duration {
        let delay_ms = match *policy {
            ReconnectPolicy::Fixed { delay_ms } => delay_ms,
            ReconnectPolicy::Exponential {
                base_delay_ms,
                max_delay_ms,
            } => {
                let factor = BACKOFF_MULTIPLIER.powi(self.attempts.min(32) as i32);
                ((base_delay_ms as f64) * factor).min(max_delay_ms as f64) as u64
            }
        };
        self.attempts = self.attempts.saturating_add(1);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_grows() {
        let policy = ReconnectPolicy::default();
        let mut backoff = BackoffState::default();

        for _ in 0..5 {
            assert_eq!(
                backoff.next_delay_and_advance(&policy),
                Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS)
            );
        }
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let policy = ReconnectPolicy::exponential(1_000);
        let mut backoff = BackoffState::default();

        let delays: Vec<u64> = (0..7)
            .map(|_| backoff.next_delay_and_advance(&policy).as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn reset_starts_over() {
        let policy = ReconnectPolicy::exponential(500);
        let mut backoff = BackoffState::default();
        backoff.next_delay_and_advance(&policy);
        backoff.next_delay_and_advance(&policy);

        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(
            backoff.next_delay_and_advance(&policy),
            Duration::from_millis(500)
        );
    }
}
