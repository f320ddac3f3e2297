//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in a server span whose parent comes from an incoming
//! W3C `traceparent` header, and records Prometheus request metrics.

use std::time::Instant;

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use tracing::{field, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::metrics::metrics;

/// Collection segments whose next segment is a caller-supplied id.
const ID_COLLECTIONS: &[&str] = &["organizations", "projects"];

/// Extract trace context from incoming request headers.
fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Replace ids in a path with `{id}` so metric labels stay low-cardinality.
///
/// A segment is an id when it follows `organizations`/`projects`, or when it
/// is numeric or UUID-shaped.
fn normalize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let is_id = !segment.is_empty()
                && (ID_COLLECTIONS.contains(&previous) || looks_like_id(segment));
            previous = segment;
            if is_id {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_id(segment: &str) -> bool {
    let numeric = segment.bytes().all(|b| b.is_ascii_digit());
    let uuid = segment.len() == 36
        && segment.bytes().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        });
    numeric || uuid
}

/// Observability middleware for Axum.
///
/// Every request gets a tracing span (exported through the OpenTelemetry
/// layer), a Prometheus sample and a completion log line.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        otel.name = %format!("{} {}", method, normalized_path),
        otel.kind = "server",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
        http.status_code = field::Empty,
    );
    let _ = span.set_parent(extract_trace_context(request.headers()));

    let response = next.run(request).instrument(span.clone()).await;

    let duration = start.elapsed();
    let status = response.status();
    span.record("http.status_code", status.as_u16());

    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    response
}
