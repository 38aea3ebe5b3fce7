//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Connection pool configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Pool name, used as a label for metrics and traces.
    ///
    /// Default is `None`, which is reported as `default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of connections to open eagerly when warming up the pool.
    ///
    /// Idle reaping never shrinks the pool below this size.
    /// Default is 2.
    #[serde(
        default = "PoolConfig::default_min_connections",
        alias = "min",
        alias = "min_idle"
    )]
    pub min_connections: usize,
    /// Maximum total (available + in use) number of connections.
    ///
    /// Default is 10.
    #[serde(
        default = "PoolConfig::default_max_connections",
        alias = "max",
        alias = "max_size"
    )]
    pub max_connections: usize,
    /// How long to wait for a connection when the pool is saturated.
    ///
    /// Default is 30 seconds.
    #[serde(
        default = "PoolConfig::default_acquire_timeout",
        alias = "timeout",
        with = "humantime_serde"
    )]
    pub acquire_timeout: Duration,
    /// How long a connection may sit unused before the idle reaper is allowed to close it.
    ///
    /// Not enforced on acquisition. See [`Pool::reap_idle`](crate::Pool::reap_idle).
    /// Default is 60 seconds.
    #[serde(
        default = "PoolConfig::default_idle_timeout",
        with = "humantime_serde"
    )]
    pub idle_timeout: Duration,
    /// Run period of a background idle reaper.
    ///
    /// Default is `None`, meaning no background reaper is started.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub reap_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: None,
            min_connections: Self::default_min_connections(),
            max_connections: Self::default_max_connections(),
            acquire_timeout: Self::default_acquire_timeout(),
            idle_timeout: Self::default_idle_timeout(),
            reap_interval: None,
        }
    }
}

impl PoolConfig {
    /// Default value for [`Self::min_connections`].
    #[must_use]
    #[inline]
    fn default_min_connections() -> usize {
        2
    }

    /// Default value for [`Self::max_connections`].
    #[must_use]
    #[inline]
    fn default_max_connections() -> usize {
        10
    }

    /// Default value for [`Self::acquire_timeout`].
    #[must_use]
    #[inline]
    fn default_acquire_timeout() -> Duration {
        Duration::from_secs(30)
    }

    /// Default value for [`Self::idle_timeout`].
    #[must_use]
    #[inline]
    fn default_idle_timeout() -> Duration {
        Duration::from_secs(60)
    }

    /// Replace invalid values with usable ones.
    ///
    /// * Zero timeouts are replaced with their defaults.
    /// * Minimum size is clamped to maximum size.
    /// * Maximum size is clamped to [`Semaphore::MAX_PERMITS`].
    ///
    /// Zero maximum size is kept as is, such pool never opens any connections.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.acquire_timeout.is_zero() {
            self.acquire_timeout = Self::default_acquire_timeout();
        }
        if self.idle_timeout.is_zero() {
            self.idle_timeout = Self::default_idle_timeout();
        }
        if self.reap_interval.is_some_and(|period| period.is_zero()) {
            self.reap_interval = None;
        }
        self.max_connections = self.max_connections.min(Semaphore::MAX_PERMITS);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    /// Set pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set number of connections to open when warming up.
    #[must_use]
    pub fn with_min_connections(mut self, min_connections: usize) -> Self {
        self.min_connections = min_connections;
        self
    }

    /// Set maximum number of connections.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set default acquisition timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Set idle timeout used by the reaper.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Enable background idle reaper with provided run period.
    #[must_use]
    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = Some(reap_interval);
        self
    }
}
