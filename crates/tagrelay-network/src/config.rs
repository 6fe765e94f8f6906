//! Transport client configuration.

use std::time::Duration;

use tagrelay_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_FRAME_SIZE, DEFAULT_RECONNECT_INITIAL_DELAY_MS,
    DEFAULT_RECONNECT_MAX_ATTEMPTS, DEFAULT_RECONNECT_MAX_DELAY_MS,
};

/// What the client does after a failed attempt or a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Give up immediately; reconnecting is up to the caller.
    #[default]
    Manual,

    /// Retry with exponentially growing delays.
    Backoff {
        initial_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    },
}

impl ReconnectPolicy {
    /// Backoff policy with the default delays and attempt limit.
    pub fn backoff() -> Self {
        Self::Backoff {
            initial_delay: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_DELAY_MS),
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
        }
    }

    /// Delay before retry number `attempt` (starting at 1).
    ///
    /// Returns `None` when no retry should be made.
    ///
    /// ```
    /// use std::time::Duration;
    /// use tagrelay_network::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy::Backoff {
    ///     initial_delay: Duration::from_millis(100),
    ///     max_delay: Duration::from_millis(300),
    ///     max_attempts: 4,
    /// };
    ///
    /// assert_eq!(policy.retry_delay(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.retry_delay(2), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.retry_delay(3), Some(Duration::from_millis(300)));
    /// assert_eq!(policy.retry_delay(5), None);
    /// assert_eq!(ReconnectPolicy::Manual.retry_delay(1), None);
    /// ```
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Manual => None,
            Self::Backoff {
                initial_delay,
                max_delay,
                max_attempts,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt - 1);
                Some(initial_delay.saturating_mul(factor).min(max_delay))
            }
        }
    }
}

/// Configuration for the transport client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for one connection attempt.
    pub connect_timeout: Duration,

    /// Behavior after failures and unexpected connection loss.
    pub reconnect: ReconnectPolicy,

    /// Largest frame accepted or sent, including framing bytes.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::Manual,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
