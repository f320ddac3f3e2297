//! Process-local cache client.
//!
//! Entries carry their own expiry instant. Expired entries read as absent
//! and are dropped on the next access or by [`InMemoryCacheClient::purge_expired`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use impact_core::CacheError;
use tokio::sync::RwLock;

use super::traits::CacheClient;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryCacheClient {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl InMemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Time left before `key` expires.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: remove unless a concurrent set replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(DISTANT_FUTURE))
            .unwrap_or(now);
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Fallback horizon when `now + ttl` overflows `Instant`.
const DISTANT_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryCacheClient::new();
        cache
            .set("global:metrics", b"{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("global:metrics").await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(cache.get("project:p:metrics").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_value_and_ttl() {
        let cache = InMemoryCacheClient::new();
        cache.set("k", b"old", Duration::from_secs(5)).await.unwrap();
        cache.set("k", b"new", Duration::from_secs(3600)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"new".to_vec()));
        let remaining = cache.ttl_remaining("k").await.unwrap();
        assert!(remaining > Duration::from_secs(3000));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent_and_is_dropped() {
        let cache = InMemoryCacheClient::new();
        cache.set("k", b"v", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = InMemoryCacheClient::new();
        cache.set("stale", b"v", Duration::ZERO).await.unwrap();
        cache.set("fresh", b"v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.ttl_remaining("stale").await.is_none());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = InMemoryCacheClient::new();
        cache.set("k", b"v", Duration::MAX).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());
    }
}
