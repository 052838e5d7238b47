//! In-process cache backend.
//!
//! A `parking_lot::Mutex<HashMap>` with lazy expiry: expired entries are
//! treated as absent on read and dropped when next touched. The lock is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Cache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Cloneable in-memory cache. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn live_value(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<Entry> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key, Instant::now()).map(|e| e.value))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let current = Self::live_value(&mut entries, key, now);

        let (count, expires_at) = match current {
            Some(entry) => {
                let n: i64 = entry.value.parse().map_err(|_| CacheError::NotAnInteger {
                    key: key.to_string(),
                })?;
                (n + 1, entry.expires_at)
            }
            None => (1, None),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CacheError> {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before - entries.len())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Match `text` against a glob where `*` matches any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    let (last, middle) = match rest.split_last() {
        Some((last, middle)) => (*last, middle),
        None => return true,
    };

    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("settings:*", "settings:gst"));
        assert!(glob_match("settings:*", "settings:"));
        assert!(!glob_match("settings:*", "invoice_seq:2024-25"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("invoice_seq:*-25", "invoice_seq:2024-25"));
        assert!(!glob_match("invoice_seq:*-25", "invoice_seq:2025-26"));
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn increment_counts_from_one() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("n").await.unwrap(), 1);
        assert_eq!(cache.increment("n").await.unwrap(), 2);
        assert_eq!(cache.get("n").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn increment_keeps_existing_expiry() {
        let cache = MemoryCache::new();
        cache.increment("window").await.unwrap();
        assert!(cache.ttl("window").is_none());
        cache.expire("window", 3600).await.unwrap();
        cache.increment("window").await.unwrap();
        let ttl = cache.ttl("window").unwrap();
        assert!(ttl > Duration::from_secs(3500));
    }

    #[tokio::test]
    async fn increment_rejects_non_integer() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("k", "abc", 60).await.unwrap();
        assert!(matches!(
            cache.increment("k").await,
            Err(CacheError::NotAnInteger { .. })
        ));
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_matching_removes_only_matches() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("settings:gst", "{}", 300).await.unwrap();
        cache.set_with_expiry("settings:ui", "{}", 300).await.unwrap();
        cache.increment("invoice_seq:2024-25").await.unwrap();
        assert_eq!(cache.delete_matching("settings:*").await.unwrap(), 2);
        assert_eq!(cache.get("settings:gst").await.unwrap(), None);
        assert_eq!(
            cache.get("invoice_seq:2024-25").await.unwrap().as_deref(),
            Some("1")
        );
    }
}
