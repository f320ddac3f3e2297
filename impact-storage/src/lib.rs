//! Impact Storage - Repository Trait and Metrics Cache
//!
//! Defines the source-of-record abstraction for impact metrics and the
//! cache-aside layer that sits in front of it. The Postgres implementation
//! of the repository lives in impact-api.

pub mod cache;
pub mod repository;

pub use repository::{InMemoryMetricsRepository, MetricsRepository};

// Re-export cache types for API integration
pub use cache::{
    decode_metrics, encode_metrics, CacheClient, CacheConfig, CacheCounters, CacheStats,
    CachedMetrics, InMemoryCacheClient, LmdbCacheClient, LmdbCacheError, MetricsCacheKey,
    MetricsCacheService, RedisCacheClient, RedisConfig, DEFAULT_METRICS_TTL,
};
