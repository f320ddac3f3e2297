//! OpenAPI document for the impact API
//!
//! Generated with utoipa from the route annotations and the schema derives
//! on the metrics shapes.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{
    self, CacheHealth, ComponentHealth, HealthDetails, HealthResponse, HealthStatus,
};
use crate::routes::metrics::{self, CacheStatsResponse};
use crate::telemetry;

use impact_core::{
    EnvironmentalImpact, GlobalImpactMetrics, OrganizationImpactMetrics, ProjectImpactMetrics,
    SocialImpact,
};

/// OpenAPI document for the impact API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Impact Metrics API",
        description = "Cached global, organization and project impact metrics",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Metrics", description = "Impact metrics served cache-aside"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus scrape endpoint")
    ),
    paths(
        // === Metrics Routes ===
        metrics::get_global_metrics,
        metrics::get_organization_metrics,
        metrics::get_project_metrics,
        metrics::refresh_metrics_cache,
        metrics::get_cache_stats,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,

        // === Observability ===
        telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        // Metrics shapes
        GlobalImpactMetrics,
        OrganizationImpactMetrics,
        ProjectImpactMetrics,
        EnvironmentalImpact,
        SocialImpact,
        CacheStatsResponse,

        // Health
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
        CacheHealth,

        // Errors
        ApiError,
        ErrorCode,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Serialize the document as pretty JSON.
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
