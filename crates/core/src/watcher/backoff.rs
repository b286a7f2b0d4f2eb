//! Reconnect delay policy.

use std::time::Duration;

use crate::config::WatcherConfig;

/// Exponential reconnect delay.
///
/// The delay starts at the initial value, doubles each time a reconnect
/// fires (capped), and drops to the short synced value once a status sync
/// confirms the session is alive. There is no retry limit.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    current_ms: u64,
    max_ms: u64,
    synced_ms: u64,
}

impl RetryBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, synced_ms: u64) -> Self {
        Self {
            current_ms: initial_ms.min(max_ms),
            max_ms,
            synced_ms,
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(
            config.initial_retry_delay_ms,
            config.max_retry_delay_ms,
            config.synced_retry_delay_ms,
        )
    }

    /// Delay for the next reconnect.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// A reconnect fired: the next failure waits twice as long.
    pub fn on_reconnect_fired(&mut self) {
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
    }

    /// A sync reported the session as waiting.
    pub fn on_synced(&mut self) {
        self.current_ms = self.synced_ms.min(self.max_ms);
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}
