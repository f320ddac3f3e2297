//! Impact API Server Entry Point
//!
//! Bootstraps telemetry and configuration, builds the metrics repository and
//! cache, spawns the scheduled refresh job and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use impact_api::telemetry::{init_tracer, shutdown_tracer, TelemetryConfig};
use impact_api::{
    connect_cache, create_api_router, metrics_refresh_task, ApiConfig, ApiError, ApiResult,
    AppState, CacheBackendConfig, DbConfig, PgMetricsRepository, RefreshJobConfig,
    RepositoryBackend,
};
use impact_storage::{InMemoryMetricsRepository, MetricsCacheService, MetricsRepository};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let repository = build_repository(RepositoryBackend::from_env()?)?;
    if let Err(e) = repository.health_check().await {
        // Readiness reports 503 until the source of record comes up.
        tracing::warn!(error = %e, "Repository not reachable at startup");
    }

    let cache_config = CacheBackendConfig::from_env()?;
    let cache = connect_cache(&cache_config).await;
    if cache.is_none() {
        tracing::warn!("Serving metrics without a cache");
    }
    let service = MetricsCacheService::new(repository, cache, cache_config.cache_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_config = RefreshJobConfig::from_env();
    let refresh_handle = if refresh_config.enabled {
        Some(tokio::spawn(metrics_refresh_task(
            service.clone(),
            refresh_config,
            shutdown_rx,
        )))
    } else {
        tracing::info!("Scheduled metrics refresh disabled");
        None
    };

    let api_config = ApiConfig::from_env();
    let app: Router = create_api_router(AppState::new(service), &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting impact API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresh_handle {
        match handle.await {
            Ok(job_metrics) => {
                let snapshot = job_metrics.snapshot();
                tracing::info!(
                    runs = snapshot.runs,
                    failures = snapshot.failures,
                    "Refresh job stopped"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Refresh job ended abnormally"),
        }
    }

    shutdown_tracer();
    Ok(())
}

fn build_repository(backend: RepositoryBackend) -> ApiResult<Arc<dyn MetricsRepository>> {
    tracing::info!(backend = backend.as_str(), "Building metrics repository");

    Ok(match backend {
        RepositoryBackend::Postgres => {
            Arc::new(PgMetricsRepository::from_config(&DbConfig::from_env())?)
        }
        RepositoryBackend::Memory => {
            tracing::warn!("Using in-memory repository; metrics start zeroed");
            Arc::new(InMemoryMetricsRepository::new())
        }
    })
}
