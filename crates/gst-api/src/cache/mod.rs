//! # Cache / Counter Port
//!
//! Key-value store with TTL, atomic increment, and pattern deletion. Used
//! for invoice sequence counters, the portal rate-limit counter, and the
//! read-through settings cache.
//!
//! Two backends: [`MemoryCache`] for single-process deployments and tests,
//! and [`RedisCache`] when `REDIS_URL` is configured.

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Errors from the cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    /// Increment on a key holding a non-integer value.
    #[error("cache key {key} does not hold an integer")]
    NotAnInteger { key: String },
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Atomically increment and return the new value. A missing key counts
    /// from zero and is created without expiry.
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Delete keys matching a glob pattern (`*` wildcard). Returns the
    /// number of keys removed. Not atomic: keys are listed, then deleted
    /// one at a time, and a key that fails to delete is skipped.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Round-trip to the backend, for readiness checks.
    async fn ping(&self) -> Result<(), CacheError>;
}
