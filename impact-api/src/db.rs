//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres and the Postgres
//! implementation of [`MetricsRepository`].
//!
//! This module does not aggregate anything itself. Each read calls one
//! source-of-record function that returns the finished snapshot as JSON:
//!
//! | Function | Result |
//! |---|---|
//! | `impact_global_metrics()` | JSON snapshot, or NULL before any data exists |
//! | `impact_organization_metrics(text)` | JSON snapshot, or NULL for unknown ids |
//! | `impact_project_metrics(text)` | JSON snapshot, or NULL for unknown ids |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use impact_core::{
    GlobalImpactMetrics, ImpactError, ImpactResult, OrganizationImpactMetrics,
    ProjectImpactMetrics, ScopeKind, StorageError,
};
use impact_storage::MetricsRepository;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

use crate::config::{parse_or, process_env};
use crate::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_POOL_SIZE, DEFAULT_DB_PORT,
    DEFAULT_DB_TIMEOUT_SECS, DEFAULT_DB_USER,
};
use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// `IMPACT_DB_HOST`, `IMPACT_DB_PORT`, `IMPACT_DB_NAME`, `IMPACT_DB_USER`,
    /// `IMPACT_DB_PASSWORD`, `IMPACT_DB_POOL_SIZE`, `IMPACT_DB_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("IMPACT_DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port: parse_or(&lookup, "IMPACT_DB_PORT", DEFAULT_DB_PORT),
            dbname: lookup("IMPACT_DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            user: lookup("IMPACT_DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password: lookup("IMPACT_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_or(&lookup, "IMPACT_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "IMPACT_DB_TIMEOUT",
                DEFAULT_DB_TIMEOUT_SECS,
            )),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are opened lazily, so this succeeds without a reachable
    /// server.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(self.timeout);
        timeouts.create = Some(self.timeout);
        timeouts.recycle = Some(self.timeout);
        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts = timeouts;
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// POSTGRES REPOSITORY
// ============================================================================

/// Metrics repository backed by the Postgres aggregate functions.
#[derive(Clone)]
pub struct PgMetricsRepository {
    pool: Pool,
}

impl PgMetricsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Run `sql` (a single-column JSON select) and decode the result.
    ///
    /// A NULL column means the scope has no data.
    async fn fetch_snapshot<T: DeserializeOwned>(
        &self,
        operation: &str,
        scope: ScopeKind,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ImpactResult<Option<T>> {
        let start = Instant::now();
        let result = self.query_json(operation, sql, params).await.and_then(|json| {
            json.map(|value| decode_snapshot(scope, value)).transpose()
        });

        if let Some(metrics) = metrics() {
            metrics.record_db_operation(
                operation,
                scope.as_str(),
                result.is_ok(),
                start.elapsed().as_secs_f64(),
            );
        }

        result
    }

    async fn query_json(
        &self,
        operation: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ImpactResult<Option<JsonValue>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_one(sql, params)
            .await
            .map_err(|e| query_error(operation, e))?;
        row.try_get::<_, Option<JsonValue>>(0)
            .map_err(|e| query_error(operation, e))
    }
}

#[async_trait]
impl MetricsRepository for PgMetricsRepository {
    async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics> {
        let snapshot = self
            .fetch_snapshot(
                "global_metrics",
                ScopeKind::Global,
                "SELECT impact_global_metrics()",
                &[],
            )
            .await?;
        Ok(snapshot.unwrap_or_else(GlobalImpactMetrics::zeroed))
    }

    async fn organization_metrics(
        &self,
        organization_id: &str,
    ) -> ImpactResult<Option<OrganizationImpactMetrics>> {
        self.fetch_snapshot(
            "organization_metrics",
            ScopeKind::Organization,
            "SELECT impact_organization_metrics($1)",
            &[&organization_id],
        )
        .await
    }

    async fn project_metrics(&self, project_id: &str) -> ImpactResult<Option<ProjectImpactMetrics>> {
        self.fetch_snapshot(
            "project_metrics",
            ScopeKind::Project,
            "SELECT impact_project_metrics($1)",
            &[&project_id],
        )
        .await
    }

    async fn health_check(&self) -> ImpactResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| query_error("health_check", e))?;
        Ok(())
    }
}

impl std::fmt::Debug for PgMetricsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgMetricsRepository")
            .field("pool_size", &status.size)
            .field("pool_available", &status.available)
            .field("pool_max_size", &status.max_size)
            .finish()
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> ImpactError {
    let storage = match err {
        PoolError::Timeout(kind) => StorageError::PoolExhausted {
            reason: format!("timed out waiting for a connection ({:?})", kind),
        },
        PoolError::Closed => StorageError::ConnectionFailed {
            reason: "connection pool is closed".to_string(),
        },
        other => StorageError::ConnectionFailed {
            reason: other.to_string(),
        },
    };
    ImpactError::Storage(storage)
}

fn query_error(operation: &str, err: tokio_postgres::Error) -> ImpactError {
    ImpactError::Storage(StorageError::QueryFailed {
        operation: operation.to_string(),
        reason: err.to_string(),
    })
}

fn decode_snapshot<T: DeserializeOwned>(scope: ScopeKind, value: JsonValue) -> ImpactResult<T> {
    serde_json::from_value(value).map_err(|e| {
        ImpactError::Storage(StorageError::InvalidSnapshot {
            scope: scope.to_string(),
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_lookup(|_| None);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "impact");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.password.is_empty());
    }

    #[test]
    fn test_db_config_from_lookup() {
        let config = DbConfig::from_lookup(|key| match key {
            "IMPACT_DB_HOST" => Some("db.internal".to_string()),
            "IMPACT_DB_PORT" => Some("6432".to_string()),
            "IMPACT_DB_POOL_SIZE" => Some("4".to_string()),
            "IMPACT_DB_TIMEOUT" => Some("5".to_string()),
            _ => None,
        });
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        let repository = PgMetricsRepository::from_config(&DbConfig::default())
            .expect("pool creation should not connect");
        assert_eq!(repository.pool_size(), 0);
    }

    #[test]
    fn test_decode_snapshot() {
        let value = json!({
            "totalProjects": 1,
            "totalVolunteers": 2,
            "totalOrganizations": 1,
            "totalHoursVolunteered": 12.5,
            "totalCertificatesIssued": 0,
            "environmentalImpact": { "co2Saved": 0.0, "treesPlanted": 3.0, "wasteReduced": 0.0 },
            "socialImpact": { "livesImpacted": 4.0, "communitiesServed": 1.0, "educationHours": 0.0 }
        });
        let metrics: GlobalImpactMetrics = decode_snapshot(ScopeKind::Global, value).unwrap();
        assert_eq!(metrics.total_volunteers, 2);
        assert_eq!(metrics.total_hours_volunteered, 12.5);
    }

    #[test]
    fn test_decode_partial_snapshot_is_invalid() {
        let err = decode_snapshot::<OrganizationImpactMetrics>(
            ScopeKind::Organization,
            json!({ "organizationId": "org-1" }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ImpactError::Storage(StorageError::InvalidSnapshot { ref scope, .. }) if scope == "organization"
        ));
    }

    #[test]
    fn test_pool_closed_maps_to_connection_failed() {
        assert!(matches!(
            pool_error(PoolError::Closed),
            ImpactError::Storage(StorageError::ConnectionFailed { .. })
        ));
    }
}
