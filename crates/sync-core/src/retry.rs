//! Reconnect backoff for the websocket session.

use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay schedule between reconnect attempts. Each attempt doubles the
/// delay up to `max_delay_ms`; after `max_attempts` the session gives up and
/// reports `ConnectionLost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether reconnect attempt `attempt` (zero-based) may still run.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait before reconnect attempt `attempt`. A server `Retry-After` hint
    /// wins when it is longer than the computed delay, but never beyond the cap.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        let hinted = retry_after_hint_ms.unwrap_or(0);
        let bounded = calculated.max(hinted).min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reconnect_waits_base_delay() {
        let policy = RetryPolicy::new(250, 8_000);
        assert_eq!(
            policy.delay_for_attempt(0, None),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn reconnect_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(100, 10_000);
        assert_eq!(
            policy.delay_for_attempt(3, None),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn reconnect_delay_is_capped() {
        let policy = RetryPolicy::new(1_000, 4_000);
        assert_eq!(
            policy.delay_for_attempt(5, None),
            Duration::from_millis(4_000)
        );
    }

    #[test]
    fn server_retry_after_extends_the_wait() {
        let policy = RetryPolicy::new(500, 20_000);
        assert_eq!(
            policy.delay_for_attempt(1, Some(10_000)),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn retry_after_hint_is_still_capped() {
        let policy = RetryPolicy::new(500, 5_000);
        assert_eq!(
            policy.delay_for_attempt(0, Some(60_000)),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(2));
        assert!(!policy.allows_attempt(3));
        assert_eq!(RetryPolicy::default().max_attempts(), 5);
    }
}
