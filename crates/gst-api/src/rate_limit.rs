//! # Portal Rate Limiting
//!
//! Fixed one-hour window on a shared cache counter. Every portal operation
//! (generate, cancel) increments the counter; the window starts when the
//! counter transitions from absent to 1. A call that pushes the count over
//! the configured threshold is refused before any network traffic.
//!
//! The counter lives in the cache service, so all replicas sharing a Redis
//! instance share one budget.

use std::sync::Arc;

use crate::cache::{Cache, CacheError};

/// Cache key of the shared counter.
pub const RATE_LIMIT_KEY: &str = "gst_api_rate_limit";

/// Window length in seconds.
pub const WINDOW_SECS: u64 = 3_600;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { count: u64 },
    Exceeded { count: u64, limit: u64 },
}

#[derive(Clone)]
pub struct PortalRateLimiter {
    cache: Arc<dyn Cache>,
}

impl std::fmt::Debug for PortalRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalRateLimiter").finish_non_exhaustive()
    }
}

impl PortalRateLimiter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Count one portal call against `limit`.
    ///
    /// Cache failures propagate: without a working counter the budget
    /// cannot be enforced, so the call is refused.
    pub async fn admit(&self, limit: u64) -> Result<Admission, CacheError> {
        let raw = self.cache.increment(RATE_LIMIT_KEY).await?;
        if raw == 1 {
            self.cache.expire(RATE_LIMIT_KEY, WINDOW_SECS).await?;
        }
        let count = u64::try_from(raw).unwrap_or(0);

        if count > limit {
            tracing::warn!(count, limit, "GST portal rate limit exceeded");
            Ok(Admission::Exceeded { count, limit })
        } else {
            Ok(Admission::Allowed { count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::time::Duration;

    #[tokio::test]
    async fn first_call_opens_window() {
        let cache = MemoryCache::new();
        let limiter = PortalRateLimiter::new(Arc::new(cache.clone()));
        assert_eq!(limiter.admit(50).await.unwrap(), Admission::Allowed { count: 1 });
        let ttl = cache.ttl(RATE_LIMIT_KEY).unwrap();
        assert!(ttl > Duration::from_secs(3_500));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let limiter = PortalRateLimiter::new(Arc::new(MemoryCache::new()));
        for expected in 1..=3 {
            assert_eq!(
                limiter.admit(3).await.unwrap(),
                Admission::Allowed { count: expected }
            );
        }
        assert_eq!(
            limiter.admit(3).await.unwrap(),
            Admission::Exceeded { count: 4, limit: 3 }
        );
    }

    #[tokio::test]
    async fn corrupt_counter_is_an_error() {
        let cache = MemoryCache::new();
        cache.set_with_expiry(RATE_LIMIT_KEY, "many", 60).await.unwrap();
        let limiter = PortalRateLimiter::new(Arc::new(cache));
        assert!(limiter.admit(50).await.is_err());
    }
}
