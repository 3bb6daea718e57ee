use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and interaction budget for a single rendering attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Timeout for the initial navigation to the embed page (default: 30s).
    pub navigation_timeout: Duration,
    /// Pause after navigation before interacting with the page (default: 3s).
    pub settle: Duration,
    /// How long to wait for a labeled trigger control (default: 5s).
    pub trigger_timeout: Duration,
    /// Number of clicks at the viewport center (default: 6).
    pub click_attempts: u32,
    /// Pause after each click before polling the capture (default: 2s).
    pub click_interval: Duration,
    /// Hard upper bound for the whole attempt, session teardown excluded.
    pub attempt_deadline: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(3),
            trigger_timeout: Duration::from_secs(5),
            click_attempts: 6,
            click_interval: Duration::from_secs(2),
            attempt_deadline: Duration::from_secs(60),
        }
    }
}

impl DriverConfig {
    pub fn with_navigation_timeout(mut self, ms: u64) -> Self {
        self.navigation_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_settle(mut self, ms: u64) -> Self {
        self.settle = Duration::from_millis(ms);
        self
    }

    pub fn with_trigger_timeout(mut self, ms: u64) -> Self {
        self.trigger_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_click_attempts(mut self, attempts: u32) -> Self {
        self.click_attempts = attempts;
        self
    }

    pub fn with_click_interval(mut self, ms: u64) -> Self {
        self.click_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_attempt_deadline(mut self, ms: u64) -> Self {
        self.attempt_deadline = Duration::from_millis(ms);
        self
    }
}

/// Configuration for resolving a batch of catalog items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub driver: DriverConfig,
    /// HTTP timeout for the liveness probe (default: 10s).
    pub probe_timeout: Duration,
    /// Rendering sessions allowed to run at once.
    pub max_concurrent_sessions: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            probe_timeout: Duration::from_secs(10),
            max_concurrent_sessions: 2,
        }
    }
}

impl ResolverConfig {
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_probe_timeout(mut self, ms: u64) -> Self {
        self.probe_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max.max(1);
        self
    }
}
