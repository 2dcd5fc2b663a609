//! Session client configuration

use std::time::Duration;

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1_000);
const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);
const RECONNECT_MAX_ATTEMPTS: u32 = 10;

const RETRY_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_MAX: u32 = 5;

/// Everything a session needs to reach the agent endpoint
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// WebSocket URL of the chat agent
    pub ws_url: String,
    /// Locally known username, used to look up the numeric user id
    pub username: String,
    /// Auth token carried by the handshake frame
    pub token: String,
    pub reconnect: ReconnectPolicy,
    pub retry: RetryPolicy,
}

impl ChatConfig {
    pub fn new(
        ws_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            username: username.into(),
            token: token.into(),
            reconnect: ReconnectPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential backoff for transport reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, max)`, saturating on overflow.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Per-message retry ticker for messages queued while disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: RETRY_INTERVAL,
            max_retries: RETRY_MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..10)
            .map(|n| policy.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn backoff_saturates_for_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(64), Duration::from_millis(30_000));
    }

    #[test]
    fn defaults_match_wire_contract() {
        let config = ChatConfig::new("ws://localhost/chat", "alice", "tok");
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.retry.interval, Duration::from_millis(500));
        assert_eq!(config.retry.max_retries, 5);
    }
}
