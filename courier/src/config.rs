//! Manager configuration.

use std::time::Duration;

/// Shortest poll interval the dispatch loop accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest poll interval the dispatch loop accepts. Bounds how long a
/// cancellation can go unobserved.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What happens when a pending request's deadline passes without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Drop the pending request without telling anyone (default)
    #[default]
    Silent,
    /// Also emit [`DispatchEvent::Expired`](crate::monitor::DispatchEvent)
    /// on the monitor channel
    Notify,
}

/// Configuration for a [`Manager`](crate::Manager).
///
/// # Examples
///
/// ```
/// use courier::config::{ExpiryPolicy, ManagerConfig};
/// use std::time::Duration;
///
/// let config = ManagerConfig::default()
///     .with_poll_interval(Duration::from_millis(50))
///     .with_expiry_policy(ExpiryPolicy::Notify)
///     .with_default_request_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Dispatch loop poll timeout
    ///
    /// Upper bound on the latency of observing a shutdown signal, and the
    /// granularity of timeout sweeps.
    /// - Default: 200ms
    /// - Clamped to 1ms..=1s
    pub poll_interval: Duration,

    /// Behavior on request expiry
    pub expiry_policy: ExpiryPolicy,

    /// Timeout applied to requests issued without an explicit one
    ///
    /// - `None`: no timeout (default)
    /// - `Some(d)`: requests expire after `d`
    pub default_request_timeout: Option<Duration>,

    /// Name given to the dispatch thread
    pub thread_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            expiry_policy: ExpiryPolicy::Silent,
            default_request_timeout: None,
            thread_name: "courier-dispatch".to_string(),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatch poll interval (clamped to 1ms..=1s).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    #[must_use]
    pub const fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    /// Set the timeout used by requests that pass none. A zero duration
    /// means no timeout.
    #[must_use]
    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Effective poll interval, clamped even if the field was set directly.
    #[must_use]
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.expiry_policy, ExpiryPolicy::Silent);
        assert_eq!(config.default_request_timeout, None);
        assert_eq!(config.thread_name, "courier-dispatch");
    }

    #[test]
    fn test_poll_interval_clamped() {
        let config = ManagerConfig::new().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);

        let config = ManagerConfig::new().with_poll_interval(Duration::from_secs(30));
        assert_eq!(config.poll_interval, MAX_POLL_INTERVAL);

        let config = ManagerConfig {
            poll_interval: Duration::ZERO,
            ..ManagerConfig::default()
        };
        assert_eq!(config.effective_poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_zero_default_timeout_means_none() {
        let config = ManagerConfig::new().with_default_request_timeout(Duration::ZERO);
        assert_eq!(config.default_request_timeout, None);

        let config = ManagerConfig::new().with_default_request_timeout(Duration::from_secs(1));
        assert_eq!(config.default_request_timeout, Some(Duration::from_secs(1)));
    }
}
