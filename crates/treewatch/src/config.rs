//! Configuration for the monitor supervisor and registrations.

use crate::filter::EventFilter;
use std::time::Duration;

/// Configuration for the monitor supervisor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the monitoring task wakes up to service backend
    /// housekeeping (retry deadlines, draining registrations).
    pub tick_interval: Duration,

    /// Maximum number of delayed recovery retries before a registration
    /// is failed with a monitoring error.
    pub retry_limit: u32,

    /// Delay between recovery retries.
    pub retry_delay: Duration,

    /// How long `stop()` waits for the monitoring task before detaching it.
    pub shutdown_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            retry_limit: 10,
            retry_delay: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl MonitorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the recovery retry limit.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Set the delay between recovery retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Per-registration options passed to [`FileMonitor::register`].
///
/// [`FileMonitor::register`]: crate::FileMonitor::register
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Whether to mirror the whole subtree or only direct children.
    pub recursive: bool,

    /// Filter deciding which entries are tracked and reported.
    pub filter: EventFilter,
}

impl WatchOptions {
    /// Create recursive options with an empty filter.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            filter: EventFilter::default(),
        }
    }

    /// Create non-recursive options with an empty filter.
    pub fn non_recursive() -> Self {
        Self {
            recursive: false,
            filter: EventFilter::default(),
        }
    }

    /// Set the event filter.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn config_builders() {
        let config = MonitorConfig::new()
            .with_tick_interval(Duration::from_millis(50))
            .with_retry_limit(3)
            .with_retry_delay(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_secs(1));
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn watch_options_default_is_non_recursive() {
        assert!(!WatchOptions::default().recursive);
        assert!(WatchOptions::recursive().recursive);
        assert!(!WatchOptions::non_recursive().recursive);
    }
}
