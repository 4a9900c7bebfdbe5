//! Cache configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Default bucket time-to-live in seconds.
pub const DEFAULT_EXPIRATION_SECS: u64 = 600;

/// Default pause between lock marker checks.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Configuration shared by every region a registry creates.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Bucket time-to-live in seconds for regions without an override.
    /// `0` means buckets never expire.
    pub default_expiration: u64,

    /// Per-region time-to-live overrides, by region name.
    pub expirations: HashMap<String, u64>,

    /// Whether bucket keys go through the registry's prefix function.
    pub use_prefix: bool,

    /// How long `get`/`put` sleep between lock marker checks.
    pub lock_poll_interval: Duration,

    /// Upper bound on a single lock wait. `None` waits for as long as the
    /// marker exists.
    pub lock_wait_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_expiration: DEFAULT_EXPIRATION_SECS,
            expirations: HashMap::new(),
            use_prefix: false,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            lock_wait_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Set the default bucket time-to-live (builder pattern).
    #[must_use]
    pub fn default_expiration(mut self, seconds: u64) -> Self {
        self.default_expiration = seconds;
        self
    }

    /// Override the time-to-live of one region.
    #[must_use]
    pub fn expiration(mut self, region: impl Into<String>, seconds: u64) -> Self {
        self.expirations.insert(region.into(), seconds);
        self
    }

    /// Replace all per-region overrides.
    #[must_use]
    pub fn expirations(mut self, expirations: HashMap<String, u64>) -> Self {
        self.expirations = expirations;
        self
    }

    /// Prefix bucket keys.
    #[must_use]
    pub fn use_prefix(mut self, use_prefix: bool) -> Self {
        self.use_prefix = use_prefix;
        self
    }

    #[must_use]
    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Bound lock waits; they fail with `LockWaitTimeout` after `timeout`.
    #[must_use]
    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = Some(timeout);
        self
    }

    /// Expiration that applies to `region`: its override, else the default.
    pub fn expiration_for(&self, region: &str) -> u64 {
        self.expirations
            .get(region)
            .copied()
            .unwrap_or(self.default_expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_expiration, 600);
        assert!(!config.use_prefix);
        assert_eq!(config.lock_poll_interval, Duration::from_millis(300));
        assert!(config.lock_wait_timeout.is_none());
    }

    #[test]
    fn test_expiration_override_falls_back_to_default() {
        let config = CacheConfig::default()
            .default_expiration(120)
            .expiration("sessions", 0)
            .expiration("users", 3600);

        assert_eq!(config.expiration_for("sessions"), 0);
        assert_eq!(config.expiration_for("users"), 3600);
        assert_eq!(config.expiration_for("other"), 120);
    }

    #[test]
    fn test_expirations_replace_wholesale() {
        let config = CacheConfig::default()
            .expiration("users", 3600)
            .expirations(HashMap::from([("groups".to_string(), 60)]));

        assert_eq!(config.expiration_for("users"), 600);
        assert_eq!(config.expiration_for("groups"), 60);
    }
}
