//! REST API Routes Module
//!
//! Includes:
//! - Impact metrics reads, forced refresh and cache statistics
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus scrape endpoint and OpenAPI document
//! - CORS support for browser-based dashboards

pub mod health;
pub mod metrics;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::constants::API_PREFIX;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// Re-export route creation functions for convenience
pub use health::create_router as health_router;
pub use metrics::create_router as metrics_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;

    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Create the complete API router.
///
/// Layout:
/// - `/api/v1/metrics/*` metrics reads, refresh and cache stats
/// - `/health/*` liveness and readiness
/// - `/metrics` Prometheus exposition
/// - `/openapi.json` API document (with the `openapi` feature)
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    let router = Router::new()
        .nest(&format!("{}/metrics", API_PREFIX), metrics_router())
        .nest("/health", health_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    let cors = build_cors_layer(api_config);

    // Execution order: CORS -> Trace -> Observability -> Handler
    // (Router::layer wraps outward, so the last call is the outermost layer.)
    router
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins, including
/// `*.domain` wildcards.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("traceparent"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(Any).allow_headers(Any);
    }

    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let allowed = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(move |origin, _| {
        origin
            .to_str()
            .map(|o| allowed.is_origin_allowed(o))
            .unwrap_or(false)
    }));

    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}
