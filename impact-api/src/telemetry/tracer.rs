//! OpenTelemetry Tracer Initialization
//!
//! Sets up the tracing subscriber (env filter, JSON log lines) and, when an
//! endpoint is configured, an OTLP/HTTP span exporter compatible with
//! Jaeger, Grafana Tempo or any OTLP collector.

use once_cell::sync::OnceCell;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{parse_or, process_env};
use crate::constants::SERVICE_NAME;
use crate::error::{ApiError, ApiResult};

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP endpoint for traces (e.g., "http://localhost:4318/v1/traces")
    pub otlp_endpoint: Option<String>,
    /// Service name for traces
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Trace sampling ratio (0.0 to 1.0)
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            trace_sample_rate: 1.0,
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `IMPACT_OTLP_ENDPOINT`: OTLP/HTTP endpoint (unset = no export)
    /// - `IMPACT_SERVICE_NAME`, `IMPACT_SERVICE_VERSION`, `IMPACT_ENVIRONMENT`
    /// - `IMPACT_TRACE_SAMPLE_RATE`: 0.0 to 1.0 (default: 1.0)
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            otlp_endpoint: lookup("IMPACT_OTLP_ENDPOINT").filter(|s| !s.trim().is_empty()),
            service_name: lookup("IMPACT_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: lookup("IMPACT_SERVICE_VERSION").unwrap_or(defaults.service_version),
            environment: lookup("IMPACT_ENVIRONMENT").unwrap_or(defaults.environment),
            trace_sample_rate: parse_or(&lookup, "IMPACT_TRACE_SAMPLE_RATE", 1.0),
        }
    }

    fn sampler(&self) -> Sampler {
        if self.trace_sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.trace_sample_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_rate)
        }
    }
}

/// Initialize the OpenTelemetry tracer and tracing subscriber.
///
/// Call once at startup before any tracing occurs. Sets up:
/// - OTLP exporter for distributed traces (if endpoint configured)
/// - TraceContext propagation (W3C traceparent header)
/// - tracing-subscriber with JSON output and the OpenTelemetry layer
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", config.service_version.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
        ])
        .build();

    let mut builder = SdkTracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    if let Some(endpoint) = &config.otlp_endpoint {
        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to create OTLP exporter: {}", e))
            })?;
        builder = builder.with_batch_exporter(exporter);
    }

    let tracer_provider = builder.build();
    let tracer = tracer_provider.tracer(config.service_name.clone());
    global::set_tracer_provider(tracer_provider.clone());
    // A second init keeps the first provider.
    let _ = TRACER_PROVIDER.set(tracer_provider);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("impact_api=debug,impact_storage=info,tower_http=debug,info")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flush pending spans and shut the tracer provider down.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer shutdown reported an error");
        }
    }
    tracing::info!("Tracer shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(config.service_name, "impact-api");
        assert_eq!(config.environment, "development");
        assert_eq!(config.trace_sample_rate, 1.0);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_telemetry_config_from_lookup() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "IMPACT_OTLP_ENDPOINT" => Some("http://collector:4318/v1/traces".to_string()),
            "IMPACT_ENVIRONMENT" => Some("production".to_string()),
            "IMPACT_TRACE_SAMPLE_RATE" => Some("0.25".to_string()),
            _ => None,
        });
        assert_eq!(
            config.otlp_endpoint.as_deref(),
            Some("http://collector:4318/v1/traces")
        );
        assert_eq!(config.environment, "production");
        assert_eq!(config.trace_sample_rate, 0.25);
    }

    #[test]
    fn test_blank_endpoint_disables_export() {
        let config = TelemetryConfig::from_lookup(|key| {
            (key == "IMPACT_OTLP_ENDPOINT").then(|| "  ".to_string())
        });
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_sampler_selection() {
        let sampler = |rate| {
            TelemetryConfig {
                trace_sample_rate: rate,
                ..Default::default()
            }
            .sampler()
        };
        assert!(matches!(sampler(1.0), Sampler::AlwaysOn));
        assert!(matches!(sampler(0.0), Sampler::AlwaysOff));
        assert!(matches!(sampler(0.5), Sampler::TraceIdRatioBased(r) if r == 0.5));
    }
}
