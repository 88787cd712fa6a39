//! Cache configuration.

use std::time::Duration;

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Time-to-live for cache entries.
    /// After this duration, entries are automatically evicted.
    pub ttl: Option<Duration>,

    /// Time-to-idle for cache entries.
    /// Entries are evicted if not read or written within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set time-to-live for cache entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Set time-to-idle for cache entries.
    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Disable TTL (entries never expire based on age).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Last message text per (chat, user), read when someone else restricts the user.
    pub fn recent_messages() -> Self {
        Self::with_capacity(50_000).ttl(Duration::from_secs(3600)) // 1 hour
    }

    /// Flagged messages waiting for a moderator's button press.
    pub fn review_tokens() -> Self {
        Self::with_capacity(20_000).ttl(Duration::from_secs(12 * 3600)) // 12 hours
    }

    /// Temporary-ban counts per user. Sliding window: every upsert resets the idle timer.
    pub fn unban_attempts() -> Self {
        Self::with_capacity(20_000)
            .no_ttl()
            .tti(Duration::from_secs(4 * 3600)) // 4 hours
    }

    /// Club membership answers.
    pub fn membership() -> Self {
        Self::with_capacity(20_000).ttl(Duration::from_secs(1800)) // 30 minutes
    }

    /// Messages already run through the pipeline (redelivery guard).
    pub fn handled_messages() -> Self {
        Self::with_capacity(100_000).ttl(Duration::from_secs(3600))
    }
}
