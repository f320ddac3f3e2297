//! Prometheus Metrics Definitions
//!
//! Defines the service metrics with their labels and exposes a /metrics
//! endpoint for Prometheus scraping. Cache statistics are sampled from the
//! metrics service at scrape time.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use impact_storage::{CacheStats, MetricsCacheService};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    register_int_gauge_vec, CounterVec, Encoder, Gauge, Histogram, HistogramVec, IntGaugeVec,
    TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Repository operation latency buckets (seconds). Aggregations can be slow.
const DB_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<ImpactMetrics>> = Lazy::new(ImpactMetrics::new);

/// Registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static ImpactMetrics> {
    METRICS.as_ref().ok()
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all service metrics.
#[derive(Clone)]
pub struct ImpactMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Repository operation counter - labels: operation, scope, status
    pub db_operations_total: CounterVec,

    /// Repository operation duration histogram - labels: operation, scope
    pub db_operation_duration_seconds: HistogramVec,

    /// Cache counters sampled from the service - labels: event
    pub cache_events: IntGaugeVec,

    /// Cache hit rate (0.0 to 1.0)
    pub cache_hit_ratio: Gauge,

    /// Refresh job runs - labels: status
    pub refresh_runs_total: CounterVec,

    /// Refresh duration histogram
    pub refresh_duration_seconds: Histogram,
}

impl ImpactMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "impact_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "impact_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            db_operations_total: register_counter_vec!(
                "impact_db_operations_total",
                "Total number of repository operations",
                &["operation", "scope", "status"]
            )
            .map_err(|e| registration_error("db_operations_total", e))?,

            db_operation_duration_seconds: register_histogram_vec!(
                "impact_db_operation_duration_seconds",
                "Repository operation duration in seconds",
                &["operation", "scope"],
                DB_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("db_operation_duration_seconds", e))?,

            cache_events: register_int_gauge_vec!(
                "impact_cache_events",
                "Metrics cache events since startup",
                &["event"]
            )
            .map_err(|e| registration_error("cache_events", e))?,

            cache_hit_ratio: register_gauge!(
                "impact_cache_hit_ratio",
                "Share of cache lookups answered from the cache"
            )
            .map_err(|e| registration_error("cache_hit_ratio", e))?,

            refresh_runs_total: register_counter_vec!(
                "impact_refresh_runs_total",
                "Metrics cache refresh runs",
                &["status"]
            )
            .map_err(|e| registration_error("refresh_runs_total", e))?,

            refresh_duration_seconds: register_histogram!(
                "impact_refresh_duration_seconds",
                "Metrics cache refresh duration in seconds",
                DB_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("refresh_duration_seconds", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a repository operation.
    pub fn record_db_operation(
        &self,
        operation: &str,
        scope: &str,
        success: bool,
        duration_secs: f64,
    ) {
        let status = if success { "success" } else { "error" };
        self.db_operations_total
            .with_label_values(&[operation, scope, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation, scope])
            .observe(duration_secs);
    }

    /// Copy a cache statistics snapshot into the gauges.
    pub fn observe_cache_stats(&self, stats: &CacheStats) {
        let events = [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("error", stats.errors),
            ("decode_failure", stats.decode_failures),
            ("write", stats.writes),
            ("write_failure", stats.write_failures),
            ("bypass", stats.bypasses),
        ];
        for (event, count) in events {
            self.cache_events
                .with_label_values(&[event])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
        self.cache_hit_ratio.set(stats.hit_rate());
    }

    /// Record one refresh run.
    pub fn record_refresh(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "failure" };
        self.refresh_runs_total.with_label_values(&[status]).inc();
        self.refresh_duration_seconds.observe(duration_secs);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/metrics",
        tag = "Observability",
        responses(
            (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
            (status = 500, description = "Failed to encode metrics"),
        ),
    )
)]
pub async fn metrics_handler(State(service): State<MetricsCacheService>) -> impl IntoResponse {
    if let Some(metrics) = metrics() {
        metrics.observe_cache_stats(&service.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
