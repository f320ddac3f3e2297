//! Cache client trait and cacheable metrics marker.
//!
//! This module defines the contract a key-value cache must satisfy and the
//! trait implemented by the three metrics shapes that may be cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use impact_core::{
    CacheError, GlobalImpactMetrics, OrganizationImpactMetrics, ProjectImpactMetrics, ScopeKind,
    ValidationError,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::key::MetricsCacheKey;

/// Key-value cache client.
///
/// Implementations are shared between concurrent requests and must be
/// thread-safe. A `set` replaces any previous value atomically and the entry
/// expires on its own after `ttl`; there is no delete in normal operation.
///
/// Errors are reported, never retried. The metrics service decides what a
/// failure means for the caller.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetch the raw value stored under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Short backend name for logs, health and stats.
    fn backend_name(&self) -> &'static str;
}

/// Marker trait for metrics snapshots that can live in the cache.
///
/// # Implementation Requirements
///
/// - `scope_kind()` must return the same value for all instances
/// - `cache_key()` must name the entry this value is stored under
/// - `validate_snapshot()` rejects anything that must not be cached
pub trait CachedMetrics: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Scope kind of this shape.
    fn scope_kind() -> ScopeKind;

    /// The key this snapshot is cached under.
    fn cache_key(&self) -> MetricsCacheKey;

    /// Check the snapshot is complete and internally consistent.
    fn validate_snapshot(&self) -> Result<(), ValidationError>;
}

// ============================================================================
// IMPLEMENTATIONS FOR METRICS SHAPES
// ============================================================================

impl CachedMetrics for GlobalImpactMetrics {
    fn scope_kind() -> ScopeKind {
        ScopeKind::Global
    }

    fn cache_key(&self) -> MetricsCacheKey {
        MetricsCacheKey::global()
    }

    fn validate_snapshot(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl CachedMetrics for OrganizationImpactMetrics {
    fn scope_kind() -> ScopeKind {
        ScopeKind::Organization
    }

    fn cache_key(&self) -> MetricsCacheKey {
        MetricsCacheKey::organization(self.organization_id.as_str())
    }

    fn validate_snapshot(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl CachedMetrics for ProjectImpactMetrics {
    fn scope_kind() -> ScopeKind {
        ScopeKind::Project
    }

    fn cache_key(&self) -> MetricsCacheKey {
        MetricsCacheKey::project(self.project_id.as_str())
    }

    fn validate_snapshot(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Statistics about cache usage by the metrics service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found no entry.
    pub misses: u64,
    /// Lookups where the cache itself failed.
    pub errors: u64,
    /// Entries that were present but could not be decoded.
    pub decode_failures: u64,
    /// Successful cache writes.
    pub writes: u64,
    /// Cache writes that failed or were skipped.
    pub write_failures: u64,
    /// Operations served with no cache attached.
    pub bypasses: u64,
}

impl CacheStats {
    /// Total lookups that reached the cache.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.errors + self.decode_failures
    }

    /// Calculate the hit rate (0.0 to 1.0).
    ///
    /// Errors and decode failures fall through to the repository, so they
    /// count against the rate like misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    decode_failures: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    bypasses: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}
