use std::time::Duration;

/// Timing knobs of [`crate::ViewportController`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControllerOptions {
    /// Minimum time between two scroll/resize driven passes.
    pub throttle_ms: u64,
    /// Quiescence after the last scroll/resize before housekeeping (eviction) runs.
    pub scroll_stopped_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Delay before the single retry after a failed or timed-out fetch.
    pub retry_delay_ms: u64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            throttle_ms: 300,
            scroll_stopped_ms: 600,
            fetch_timeout_ms: 5000,
            retry_delay_ms: 1000,
        }
    }
}

impl ControllerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_throttle_ms(mut self, ms: u64) -> Self {
        self.throttle_ms = ms;
        self
    }

    pub fn with_scroll_stopped_ms(mut self, ms: u64) -> Self {
        self.scroll_stopped_ms = ms;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn scroll_stopped(&self) -> Duration {
        Duration::from_millis(self.scroll_stopped_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
