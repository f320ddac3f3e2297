//! Cache backend selection and connection.
//!
//! The metrics cache is an optimization, never a dependency: a backend that
//! cannot be reached at startup is logged and the service runs without one.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use impact_core::ConfigError;
use impact_storage::{
    CacheClient, CacheConfig, InMemoryCacheClient, LmdbCacheClient, RedisCacheClient, RedisConfig,
};
use tracing::{info, warn};

use crate::config::{parse_or, process_env};
use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_LMDB_MAX_SIZE_MB, DEFAULT_LMDB_PATH,
    DEFAULT_REDIS_COMMAND_TIMEOUT_MS, DEFAULT_REDIS_URL,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Which cache client backs the metrics service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// No cache; every read goes to the repository.
    None,
    /// Process-local map. Single node only.
    #[default]
    Memory,
    /// Persistent local LMDB file.
    Lmdb,
    /// Shared Redis server.
    Redis,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Memory => "memory",
            Self::Lmdb => "lmdb",
            Self::Redis => "redis",
        }
    }
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "disabled" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::InvalidValue {
                field: "IMPACT_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected none, memory, lmdb or redis".to_string(),
            }),
        }
    }
}

/// Cache backend configuration.
#[derive(Debug, Clone)]
pub struct CacheBackendConfig {
    pub backend: CacheBackend,
    /// TTL for every metrics entry, all scopes.
    pub ttl: Duration,
    pub redis: RedisConfig,
    pub lmdb_path: PathBuf,
    pub lmdb_max_size_mb: usize,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            redis: RedisConfig {
                url: DEFAULT_REDIS_URL.to_string(),
                key_prefix: String::new(),
                command_timeout: Duration::from_millis(DEFAULT_REDIS_COMMAND_TIMEOUT_MS),
            },
            lmdb_path: PathBuf::from(DEFAULT_LMDB_PATH),
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl CacheBackendConfig {
    /// Load from environment variables.
    ///
    /// - `IMPACT_CACHE_BACKEND`: none, memory, lmdb or redis (default: memory)
    /// - `IMPACT_CACHE_TTL_SECS`: entry TTL (default: 86400)
    /// - `IMPACT_REDIS_URL`, `IMPACT_REDIS_KEY_PREFIX`, `IMPACT_REDIS_TIMEOUT_MS`
    /// - `IMPACT_LMDB_PATH`, `IMPACT_LMDB_MAX_SIZE_MB`
    ///
    /// An unknown backend name or a zero TTL is an error rather than a
    /// silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("IMPACT_CACHE_BACKEND") {
            Some(value) => value.parse()?,
            None => defaults.backend,
        };

        let ttl_secs = parse_or(&lookup, "IMPACT_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS);
        if ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "IMPACT_CACHE_TTL_SECS".to_string(),
                value: "0".to_string(),
                reason: "TTL must be at least one second".to_string(),
            });
        }

        let redis = RedisConfig {
            url: lookup("IMPACT_REDIS_URL").unwrap_or(defaults.redis.url),
            key_prefix: lookup("IMPACT_REDIS_KEY_PREFIX").unwrap_or_default(),
            command_timeout: Duration::from_millis(parse_or(
                &lookup,
                "IMPACT_REDIS_TIMEOUT_MS",
                DEFAULT_REDIS_COMMAND_TIMEOUT_MS,
            )),
        };

        Ok(Self {
            backend,
            ttl: Duration::from_secs(ttl_secs),
            redis,
            lmdb_path: lookup("IMPACT_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_max_size_mb: parse_or(&lookup, "IMPACT_LMDB_MAX_SIZE_MB", DEFAULT_LMDB_MAX_SIZE_MB),
        })
    }

    /// Service-level cache settings.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new().with_ttl(self.ttl)
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

/// Build the configured cache client.
///
/// Returns `None` when caching is disabled or the backend cannot be opened;
/// the caller then runs the metrics service in degraded (uncached) mode.
pub async fn connect_cache(config: &CacheBackendConfig) -> Option<Arc<dyn CacheClient>> {
    match config.backend {
        CacheBackend::None => {
            info!("Metrics cache disabled");
            None
        }
        CacheBackend::Memory => {
            info!(ttl_secs = config.ttl.as_secs(), "Using in-memory metrics cache");
            Some(Arc::new(InMemoryCacheClient::new()))
        }
        CacheBackend::Lmdb => {
            match LmdbCacheClient::new(&config.lmdb_path, config.lmdb_max_size_mb) {
                Ok(client) => {
                    info!(
                        path = %config.lmdb_path.display(),
                        max_size_mb = config.lmdb_max_size_mb,
                        "Using LMDB metrics cache"
                    );
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!(
                        path = %config.lmdb_path.display(),
                        error = %e,
                        "LMDB cache unavailable, continuing without cache"
                    );
                    None
                }
            }
        }
        CacheBackend::Redis => match RedisCacheClient::connect(config.redis.clone()).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "Redis cache unavailable, continuing without cache");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CacheBackendConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.cache_config().entry_ttl, Duration::from_secs(86_400));
        assert_eq!(config.redis.command_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_from_lookup() {
        let config = CacheBackendConfig::from_lookup(lookup_from(&[
            ("IMPACT_CACHE_BACKEND", "Redis"),
            ("IMPACT_CACHE_TTL_SECS", "3600"),
            ("IMPACT_REDIS_URL", "redis://cache:6379/2"),
            ("IMPACT_REDIS_KEY_PREFIX", "impact:"),
            ("IMPACT_REDIS_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.backend, CacheBackend::Redis);
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.redis.url, "redis://cache:6379/2");
        assert_eq!(config.redis.key_prefix, "impact:");
        assert_eq!(config.redis.command_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = CacheBackendConfig::from_lookup(lookup_from(&[("IMPACT_CACHE_BACKEND", "memcached")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "IMPACT_CACHE_BACKEND"));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let err = CacheBackendConfig::from_lookup(lookup_from(&[("IMPACT_CACHE_TTL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "IMPACT_CACHE_TTL_SECS"));
    }

    #[tokio::test]
    async fn test_connect_none_and_memory() {
        let mut config = CacheBackendConfig {
            backend: CacheBackend::None,
            ..CacheBackendConfig::default()
        };
        assert!(connect_cache(&config).await.is_none());

        config.backend = CacheBackend::Memory;
        let cache = connect_cache(&config).await.expect("memory cache always connects");
        assert_eq!(cache.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_connect_lmdb() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CacheBackendConfig {
            backend: CacheBackend::Lmdb,
            lmdb_path: dir.path().join("cache"),
            lmdb_max_size_mb: 8,
            ..CacheBackendConfig::default()
        };
        let cache = connect_cache(&config).await.expect("lmdb cache should open");
        assert_eq!(cache.backend_name(), "lmdb");
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_no_cache() {
        let config = CacheBackendConfig {
            backend: CacheBackend::Redis,
            redis: RedisConfig {
                url: "redis://127.0.0.1:1".to_string(),
                key_prefix: String::new(),
                command_timeout: Duration::from_millis(200),
            },
            ..CacheBackendConfig::default()
        };
        assert!(connect_cache(&config).await.is_none());
    }
}
