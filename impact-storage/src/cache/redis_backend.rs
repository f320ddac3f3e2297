//! Redis cache client.
//!
//! Shared network cache for multi-node deployments. Values are written with
//! `SET key value EX ttl` so Redis owns expiry; reads are plain `GET`.
//! Every command is bounded by a per-command timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use impact_core::CacheError;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::traits::CacheClient;

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Prepended to every key. Empty by default.
    pub key_prefix: String,
    /// Upper bound for connect and for each command.
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            command_timeout: Duration::from_millis(500),
        }
    }
}

/// Redis-backed cache client over a multiplexed connection.
#[derive(Clone)]
pub struct RedisCacheClient {
    connection: MultiplexedConnection,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisCacheClient {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CacheError::Connection {
                reason: format!("invalid Redis URL: {}", e),
            }
        })?;

        let mut connection = with_timeout(
            "CONNECT",
            config.command_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await?;

        let _: String = with_timeout(
            "PING",
            config.command_timeout,
            redis::cmd("PING").query_async(&mut connection),
        )
        .await?;

        info!(
            url = %redacted_url(&config.url),
            prefix = %config.key_prefix,
            "Redis cache connected"
        );

        Ok(Self {
            connection,
            key_prefix: config.key_prefix,
            command_timeout: config.command_timeout,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection.clone();
        let full_key = self.full_key(key);
        with_timeout("GET", self.command_timeout, conn.get(&full_key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let full_key = self.full_key(key);
        with_timeout(
            "SET",
            self.command_timeout,
            conn.set_ex::<_, _, ()>(&full_key, value, ttl_seconds(ttl)),
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Redis rejects `EX 0`, so sub-second TTLs round up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T, CacheError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CacheError::Connection {
            reason: format!("{} failed: {}", operation, e),
        }),
        Err(_) => Err(CacheError::Timeout {
            operation: operation.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Strip credentials from a Redis URL before logging it.
fn redacted_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
