//! Impact Metrics REST API Routes
//!
//! Thin callers of the metrics cache service. Reads are served cache-aside;
//! `POST /refresh` forces a recompute of the global snapshot.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use impact_storage::MetricsCacheService;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use impact_core::{GlobalImpactMetrics, OrganizationImpactMetrics, ProjectImpactMetrics};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::metrics;

// ============================================================================
// TYPES
// ============================================================================

/// Cache usage since the service started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheStatsResponse {
    /// Whether a cache client is attached at all
    pub attached: bool,
    /// Backend name ("memory", "lmdb", "redis"), absent when detached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// TTL applied to every entry
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub decode_failures: u64,
    pub writes: u64,
    pub write_failures: u64,
    /// Reads and refreshes that ran with no cache attached
    pub bypasses: u64,
    /// Hits over lookups, 0.0 before the first lookup
    pub hit_rate: f64,
}

impl CacheStatsResponse {
    fn from_service(service: &MetricsCacheService) -> Self {
        let stats = service.stats();
        Self {
            attached: service.is_cache_attached(),
            backend: service.cache_backend().map(str::to_string),
            ttl_seconds: service.config().entry_ttl.as_secs(),
            hits: stats.hits,
            misses: stats.misses,
            errors: stats.errors,
            decode_failures: stats.decode_failures,
            writes: stats.writes,
            write_failures: stats.write_failures,
            bypasses: stats.bypasses,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Reject blank ids; anything else is passed to the service as received.
fn require_id<'a>(id: &'a str, field: &str) -> ApiResult<&'a str> {
    if id.trim().is_empty() {
        return Err(ApiError::missing_field(field));
    }
    Ok(id)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/metrics/global - Platform-wide impact metrics
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/metrics/global",
    tag = "Metrics",
    responses(
        (status = 200, description = "Global impact metrics", body = GlobalImpactMetrics),
        (status = 500, description = "Source of record query failed", body = ApiError),
        (status = 503, description = "Source of record unavailable", body = ApiError),
    ),
))]
pub async fn get_global_metrics(
    State(service): State<MetricsCacheService>,
) -> ApiResult<impl IntoResponse> {
    let metrics = service.global_metrics().await?;
    Ok(Json(metrics))
}

/// GET /api/v1/metrics/organizations/{organization_id} - Metrics for one organization
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/metrics/organizations/{organization_id}",
    tag = "Metrics",
    params(
        ("organization_id" = String, Path, description = "Organization ID")
    ),
    responses(
        (status = 200, description = "Organization impact metrics", body = OrganizationImpactMetrics),
        (status = 404, description = "Organization not found", body = ApiError),
        (status = 503, description = "Source of record unavailable", body = ApiError),
    ),
))]
pub async fn get_organization_metrics(
    State(service): State<MetricsCacheService>,
    Path(organization_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_id(&organization_id, "organization_id")?;
    let metrics = service
        .organization_metrics(organization_id)
        .await?
        .ok_or_else(|| ApiError::organization_not_found(organization_id))?;
    Ok(Json(metrics))
}

/// GET /api/v1/metrics/projects/{project_id} - Metrics for one project
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/metrics/projects/{project_id}",
    tag = "Metrics",
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project impact metrics", body = ProjectImpactMetrics),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 503, description = "Source of record unavailable", body = ApiError),
    ),
))]
pub async fn get_project_metrics(
    State(service): State<MetricsCacheService>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let project_id = require_id(&project_id, "project_id")?;
    let metrics = service
        .project_metrics(project_id)
        .await?
        .ok_or_else(|| ApiError::project_not_found(project_id))?;
    Ok(Json(metrics))
}

/// POST /api/v1/metrics/refresh - Recompute and re-cache the global snapshot
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/metrics/refresh",
    tag = "Metrics",
    responses(
        (status = 204, description = "Global metrics recomputed and cached"),
        (status = 500, description = "Source of record query failed", body = ApiError),
        (status = 503, description = "Source of record unavailable", body = ApiError),
    ),
))]
pub async fn refresh_metrics_cache(
    State(service): State<MetricsCacheService>,
) -> ApiResult<StatusCode> {
    let start = Instant::now();
    let result = service.refresh_metrics_cache().await;

    if let Some(m) = metrics() {
        m.record_refresh(result.is_ok(), start.elapsed().as_secs_f64());
    }

    result?;
    tracing::info!(
        duration_ms = start.elapsed().as_millis(),
        "Global metrics refreshed on request"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/metrics/cache/stats - Cache statistics
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/metrics/cache/stats",
    tag = "Metrics",
    responses(
        (status = 200, description = "Cache statistics", body = CacheStatsResponse),
    ),
))]
pub async fn get_cache_stats(State(service): State<MetricsCacheService>) -> impl IntoResponse {
    Json(CacheStatsResponse::from_service(&service))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the metrics router, nested under `/api/v1/metrics`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/global", get(get_global_metrics))
        .route("/organizations/:organization_id", get(get_organization_metrics))
        .route("/projects/:project_id", get(get_project_metrics))
        .route("/refresh", post(refresh_metrics_cache))
        .route("/cache/stats", get(get_cache_stats))
}
