//! Impact API - HTTP Service for Cached Impact Metrics
//!
//! Serves global, organization and project impact metrics through the
//! cache-aside `MetricsCacheService` from impact-storage. The source of
//! record is PostgreSQL (aggregate functions returning JSON); the cache is
//! in-memory, LMDB or Redis and is optional at runtime.

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{connect_cache, CacheBackend, CacheBackendConfig};
pub use config::{ApiConfig, RepositoryBackend};
pub use db::{DbConfig, PgMetricsRepository};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{metrics_refresh_task, RefreshJobConfig};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
