//! Cache-aside layer for impact metrics.
//!
//! The cache is purely an optimization. Reads consult it first and fall back
//! to the [`MetricsRepository`](crate::MetricsRepository) on a miss, on a
//! cache fault, or on an entry that fails to decode. Only repository errors
//! ever reach the caller.
//!
//! # Keys
//!
//! [`MetricsCacheKey`] is the only way to name a cache entry. It encodes the
//! scope kind and id into the stable strings `global:metrics`,
//! `organization:{id}:metrics` and `project:{id}:metrics`.
//!
//! # Example
//!
//! ```ignore
//! let service = MetricsCacheService::new(repository, Some(cache), CacheConfig::default());
//!
//! // Served from cache when warm, from the repository otherwise
//! let global = service.global_metrics().await?;
//!
//! // Absent organizations are reported, never cached
//! let org = service.organization_metrics("org-42").await?;
//!
//! // Scheduled job: recompute and overwrite the global entry
//! service.refresh_metrics_cache().await?;
//! ```

pub mod cache_aside;
pub mod codec;
pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod redis_backend;
pub mod traits;

pub use cache_aside::{CacheConfig, MetricsCacheService, DEFAULT_METRICS_TTL};
pub use codec::{decode_metrics, encode_metrics};
pub use key::MetricsCacheKey;
pub use lmdb_backend::{LmdbCacheClient, LmdbCacheError};
pub use memory_backend::InMemoryCacheClient;
pub use redis_backend::{RedisCacheClient, RedisConfig};
pub use traits::{CacheClient, CacheCounters, CacheStats, CachedMetrics};
